use tracing::trace;

use crate::config::TrackingConfig;
use crate::mot::{RegionFilter, SmallEntityTracker};
use crate::pipeline::collaborators::MotionObservation;
use crate::pipeline::{SmallInput, SmallStreamItem};

/// Producer of the small-entity stream: region filtering followed by tracking
pub struct SmallDetectionStage {
    filter: RegionFilter,
    tracker: SmallEntityTracker,
    frame_sized: bool,
}

impl SmallDetectionStage {
    pub fn new(config: &TrackingConfig) -> Self {
        SmallDetectionStage {
            filter: RegionFilter::new(&config.region),
            tracker: SmallEntityTracker::new(&config.small),
            frame_sized: false,
        }
    }
    /// Runs one frame through the filter and the tracker.
    ///
    /// Blurry frames and frames without a camera-motion estimate only move the
    /// large-entity regions; the tracker is left untouched and the item is empty.
    pub fn process(&mut self, input: SmallInput, observation: MotionObservation) -> SmallStreamItem {
        if !self.frame_sized {
            let (width, height) = input.frame.dimensions();
            self.filter.set_frame_size(width as f32, height as f32);
            self.frame_sized = true;
        }
        let translation = match observation.translation {
            Some(translation) if !input.blurry => translation,
            _ => {
                trace!(frame_index = input.frame_index, blurry = input.blurry, "no motion estimate, tracker skipped");
                self.filter.update_regions(&input.boxes, None);
                self.filter.clear();
                return SmallStreamItem {
                    frame_index: input.frame_index,
                    frame: input.frame,
                    expired: vec![],
                    translation: None,
                    displayable: vec![],
                    blurry: input.blurry,
                    blur_text: input.blur_text,
                };
            }
        };

        self.filter.update_regions(&input.boxes, Some(translation));
        let points = self.filter.filter(&observation.points);
        self.tracker.update(input.frame_index, &points, Some(translation));
        let displayable = self.tracker.display_tracks();
        let expired = self.tracker.clear();
        self.filter.clear();

        SmallStreamItem {
            frame_index: input.frame_index,
            frame: input.frame,
            expired,
            translation: Some(translation),
            displayable,
            blurry: input.blurry,
            blur_text: input.blur_text,
        }
    }
    pub fn get_tracker(&self) -> &SmallEntityTracker {
        &self.tracker
    }
    pub fn get_filter(&self) -> &RegionFilter {
        &self.filter
    }
}
