//! Interfaces of the components living outside of this crate
use image::RgbImage;

use crate::mot::{Annotation, CandidatePoint, FinishedEntity, TrackedBox, TrackerError};
use crate::pipeline::RenderPayload;
use crate::utils::Translation;

/// Output of the large-entity detector: boxes with re-identified track ids and
/// their class/cluster annotations, index-aligned
#[derive(Debug, Clone, Default)]
pub struct LargeDetections {
    pub boxes: Vec<TrackedBox>,
    pub annotations: Vec<Annotation>,
}

/// Neural detector + re-identification
pub trait BigDetector: Send {
    fn detect(&mut self, frame_index: u64, frame: &RgbImage) -> Result<LargeDetections, TrackerError>;
}

/// Output of the motion detector for one frame
#[derive(Debug, Clone, Default)]
pub struct MotionObservation {
    pub points: Vec<CandidatePoint>,
    /// None when feature matching failed, on blurry frames and on the very first frame
    pub translation: Option<Translation>,
}

/// Frame-difference point detector + inter-frame feature matching.
/// Keeps its own previous frame, so it sees every frame routed to it.
pub trait MotionDetector: Send {
    fn detect(&mut self, frame_index: u64, frame: &RgbImage, blurry: bool) -> Result<MotionObservation, TrackerError>;
}

/// Classification/report stage receiving every expired record
pub trait RecordSink: Send {
    fn accept(&mut self, entity: FinishedEntity) -> Result<(), TrackerError>;
}

/// Rendering/export stage
pub trait RenderSink: Send {
    fn render(&mut self, payload: RenderPayload) -> Result<(), TrackerError>;
}

impl RecordSink for Vec<FinishedEntity> {
    fn accept(&mut self, entity: FinishedEntity) -> Result<(), TrackerError> {
        self.push(entity);
        Ok(())
    }
}

impl RenderSink for Vec<RenderPayload> {
    fn render(&mut self, payload: RenderPayload) -> Result<(), TrackerError> {
        self.push(payload);
        Ok(())
    }
}
