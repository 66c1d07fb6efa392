use std::collections::{HashMap, HashSet};

use image::{imageops, RgbImage};
use tracing::{debug, warn};

use crate::config::BigConfig;
use crate::mot::entity::{DisplayEntity, Entity};
use crate::mot::mot_errors::TrackerError;
use crate::mot::{Annotation, LargeEntityRecord, TrackedBox};
use crate::utils::{Rect, Translation};

/// Keeps lifecycle records of large organisms tracked by an external detector
pub struct BigEntityManager {
    // Updates a record lives for. Default is 200
    survival: i64,
    // Screenshot is refreshed while a record has at most this many detections. Default is 30
    screenshot_cutoff: usize,
    // Storage
    objects: HashMap<u64, LargeEntityRecord>,
    // Ids detected on the last update
    display_ids: Vec<u64>,
}

impl Default for BigEntityManager {
    fn default() -> Self {
        BigEntityManager::new(&BigConfig::default())
    }
}

impl BigEntityManager {
    /// Creates new instance of BigEntityManager
    ///
    /// Basic usage:
    ///
    /// ```
    /// use fauna_rs::config::BigConfig;
    /// use fauna_rs::mot::BigEntityManager;
    /// let manager = BigEntityManager::new(&BigConfig::default());
    /// assert!(manager.is_empty());
    /// ```
    pub fn new(config: &BigConfig) -> Self {
        BigEntityManager {
            survival: config.survival,
            screenshot_cutoff: config.screenshot_cutoff,
            objects: HashMap::new(),
            display_ids: Vec::new(),
        }
    }
    /// Applies one cycle of externally tracked boxes.
    ///
    /// Every known record is updated exactly once: with its box when the track is
    /// present, with the translation only when it is not.
    pub fn update(
        &mut self,
        frame_index: u64,
        frame: &RgbImage,
        boxes: &[TrackedBox],
        annotations: &[Annotation],
        blurry: bool,
        translation: Option<Translation>,
    ) -> Result<(), TrackerError> {
        if boxes.len() != annotations.len() {
            return Err(TrackerError::BadSize(format!(
                "Boxes and annotations arrays must have the same length. Boxes array size: {}. Annotations array size: {}",
                boxes.len(),
                annotations.len()
            )));
        }
        self.display_ids.clear();

        // Index detections by track id, first occurrence wins
        let mut detected: HashMap<u64, usize> = HashMap::with_capacity(boxes.len());
        for (idx, tracked) in boxes.iter().enumerate() {
            if !tracked.rect.is_finite() {
                warn!(frame_index, track_id = tracked.track_id, "skipping non-finite box");
                continue;
            }
            if detected.contains_key(&tracked.track_id) {
                warn!(frame_index, track_id = tracked.track_id, "duplicate track id in one cycle, skipping");
                continue;
            }
            detected.insert(tracked.track_id, idx);
        }

        // Register new ones
        for &track_id in detected.keys() {
            if !self.objects.contains_key(&track_id) {
                debug!(frame_index, track_id, "new large entity");
                self.objects
                    .insert(track_id, LargeEntityRecord::new(track_id, frame_index, self.survival));
            }
        }

        for (track_id, object) in self.objects.iter_mut() {
            match detected.get(track_id) {
                Some(&idx) => {
                    let rect = &boxes[idx].rect;
                    if object.wants_screenshot(self.screenshot_cutoff) {
                        if let Some(screenshot) = crop_frame(frame, rect) {
                            object.set_screenshot(screenshot);
                        }
                    }
                    object.update(rect, &annotations[idx], blurry, translation);
                    self.display_ids.push(*track_id);
                }
                None => object.update_translation(blurry, translation),
            }
        }
        self.display_ids.sort_unstable();
        Ok(())
    }
    /// Removes expired records and returns them trimmed to their last detection.
    /// A second call without an update in between returns nothing.
    pub fn clear(&mut self) -> Vec<LargeEntityRecord> {
        let expired: Vec<u64> = self
            .objects
            .iter()
            .filter(|(_, object)| object.is_expired())
            .map(|(id, _)| *id)
            .collect();
        let mut cleared = Vec::with_capacity(expired.len());
        for track_id in expired {
            if let Some(mut object) = self.objects.remove(&track_id) {
                object.trim_trailing_misses();
                debug!(track_id, detections = object.detections_count(), "large entity expired");
                cleared.push(object);
            }
        }
        self.display_ids.retain(|id| self.objects.contains_key(id));
        cleared.sort_by_key(|object| object.get_track_id());
        cleared
    }
    /// Entities that got a real detection on the last update
    pub fn display_tracks(&self) -> Vec<DisplayEntity> {
        self.display_ids
            .iter()
            .filter_map(|id| self.objects.get(id))
            .map(|object| object.to_display())
            .collect()
    }
    pub fn get(&self, track_id: u64) -> Option<&LargeEntityRecord> {
        self.objects.get(&track_id)
    }
    pub fn track_ids(&self) -> HashSet<u64> {
        self.objects.keys().copied().collect()
    }
    pub fn len(&self) -> usize {
        self.objects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Pixels of `frame` under `rect`, clamped to the frame. None if nothing is left.
fn crop_frame(frame: &RgbImage, rect: &Rect) -> Option<RgbImage> {
    let (width, height) = frame.dimensions();
    let left = rect.left.max(0.0).min(width as f32) as u32;
    let top = rect.top.max(0.0).min(height as f32) as u32;
    let right = rect.right.max(0.0).min(width as f32) as u32;
    let bottom = rect.bottom.max(0.0).min(height as f32) as u32;
    if right <= left || bottom <= top {
        return None;
    }
    Some(imageops::crop_imm(frame, left, top, right - left, bottom - top).to_image())
}
