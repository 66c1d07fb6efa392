use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbImage;

use crate::mot::{Annotation, DisplayEntity, SmallEntityRecord, TrackedBox};
use crate::utils::Translation;

/// Shared handle to a decoded frame
pub type Frame = Arc<RgbImage>;

/// Frame as it enters the pipeline, blur already scored upstream
#[derive(Debug, Clone)]
pub struct InputFrame {
    pub frame_index: u64,
    pub frame: Frame,
    pub blurry: bool,
    pub blur_text: String,
}

impl InputFrame {
    pub fn new(frame_index: u64, frame: Frame) -> Self {
        InputFrame {
            frame_index,
            frame,
            blurry: false,
            blur_text: String::new(),
        }
    }
    pub fn with_blur(mut self, blurry: bool, blur_text: impl Into<String>) -> Self {
        self.blurry = blurry;
        self.blur_text = blur_text.into();
        self
    }
}

/// Result of the large-entity detector for one frame
#[derive(Debug, Clone)]
pub struct BigStreamItem {
    pub frame_index: u64,
    pub frame: Frame,
    pub boxes: Vec<TrackedBox>,
    pub annotations: Vec<Annotation>,
    pub blurry: bool,
    pub blur_text: String,
}

/// Frame handed from the large-entity detector to the small-entity detector
#[derive(Debug, Clone)]
pub struct SmallInput {
    pub frame_index: u64,
    pub frame: Frame,
    pub boxes: Vec<TrackedBox>,
    pub blurry: bool,
    pub blur_text: String,
}

/// Result of the small-entity stage for one frame. Expired records were already
/// swept by the stage's own tracker.
#[derive(Debug, Clone)]
pub struct SmallStreamItem {
    pub frame_index: u64,
    pub frame: Frame,
    pub expired: Vec<SmallEntityRecord>,
    pub translation: Option<Translation>,
    pub displayable: Vec<DisplayEntity>,
    pub blurry: bool,
    pub blur_text: String,
}

/// Everything the render stage needs for one synchronized cycle
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub frame: Frame,
    pub blurry: bool,
    pub blur_text: String,
    pub big_frame_index: Option<u64>,
    pub small_frame_index: Option<u64>,
    pub entities: Vec<DisplayEntity>,
    /// Genuine entities finalized so far, per label
    pub counts: BTreeMap<String, usize>,
}

/// One iteration of the synchronizer that consumed at least one item
#[derive(Debug, Clone)]
pub struct SynchronizedCycleEvent {
    pub big_frame_index: Option<u64>,
    pub small_frame_index: Option<u64>,
    pub translation: Option<Translation>,
    pub payload: RenderPayload,
}
