use std::collections::BTreeMap;

use image::RgbImage;

use crate::mot::entity::{cut_trailing_misses, DisplayEntity, Entity, EntityKind};
use crate::utils::{DriftTrack, FrozenTrack, Point, Rect, Translation};

/// Box of an externally tracked organism on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBox {
    pub rect: Rect,
    pub track_id: u64,
}

impl TrackedBox {
    pub fn new(rect: Rect, track_id: u64) -> Self {
        TrackedBox { rect, track_id }
    }
}

/// Detector annotations that go along with a `TrackedBox`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub class_id: u32,
    /// How many organisms the detector merged into this box
    pub cluster_count: u32,
}

impl Annotation {
    pub fn new(class_id: u32, cluster_count: u32) -> Self {
        Annotation { class_id, cluster_count }
    }
}

/// Lifecycle record of a large organism.
///
/// Detection sequence, box history, blur history and center history always have
/// the same length: one entry per update.
#[derive(Debug, Clone)]
pub struct LargeEntityRecord {
    track_id: u64,
    first_frame: u64,
    survival: i64,
    detection_sequence: Vec<u8>,
    box_history: Vec<Rect>,
    class_votes: BTreeMap<u32, usize>,
    cluster_history: Vec<u32>,
    blur_history: Vec<bool>,
    center_history: DriftTrack,
    // Center history as it was on the last real detection
    trajectory: FrozenTrack,
    screenshot: Option<RgbImage>,
    detected_now: bool,
}

impl LargeEntityRecord {
    pub fn new(_track_id: u64, _first_frame: u64, _survival: i64) -> Self {
        LargeEntityRecord {
            track_id: _track_id,
            first_frame: _first_frame,
            survival: _survival,
            detection_sequence: Vec::new(),
            box_history: Vec::new(),
            class_votes: BTreeMap::new(),
            cluster_history: Vec::new(),
            blur_history: Vec::new(),
            center_history: DriftTrack::new(),
            trajectory: FrozenTrack::default(),
            screenshot: None,
            detected_now: false,
        }
    }
    /// Update with a real detection of this track on the current cycle
    pub fn update(&mut self, bbox: &Rect, annotation: &Annotation, blurry: bool, translation: Option<Translation>) {
        self.survival -= 1;
        self.center_history.shift(Translation::or_zero(translation));
        self.detection_sequence.push(1);
        self.box_history.push(*bbox);
        self.blur_history.push(blurry);
        *self.class_votes.entry(annotation.class_id).or_insert(0) += 1;
        self.cluster_history.push(annotation.cluster_count);
        self.center_history.push(bbox.center());
        self.trajectory = self.center_history.freeze();
        self.detected_now = true;
    }
    /// Update on a cycle where the track was not detected: the last box is repeated
    /// and the whole center history follows the camera
    pub fn update_translation(&mut self, blurry: bool, translation: Option<Translation>) {
        self.survival -= 1;
        self.detected_now = false;
        self.center_history.shift(Translation::or_zero(translation));
        let (last_box, last_center) = match (self.box_history.last(), self.center_history.last()) {
            (Some(b), Some(c)) => (*b, c),
            // Nothing to repeat yet
            _ => return,
        };
        self.detection_sequence.push(0);
        self.box_history.push(last_box);
        self.blur_history.push(blurry);
        self.center_history.push(last_center);
    }
    /// Screenshot is refreshed only while the record is young
    pub fn wants_screenshot(&self, cutoff: usize) -> bool {
        self.detections_count() <= cutoff
    }
    pub fn set_screenshot(&mut self, screenshot: RgbImage) {
        self.screenshot = Some(screenshot)
    }
    pub fn get_screenshot(&self) -> Option<&RgbImage> {
        self.screenshot.as_ref()
    }
    /// Class with most votes. On a tie the lowest class id wins.
    pub fn majority_class(&self) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (&class_id, &votes) in self.class_votes.iter() {
            match best {
                Some((_, best_votes)) if best_votes >= votes => {}
                _ => best = Some((class_id, votes)),
            }
        }
        best.map(|(class_id, _)| class_id)
    }
    /// Average cluster size rounded up
    pub fn cluster_size(&self) -> u32 {
        if self.cluster_history.is_empty() {
            return 0;
        }
        let sum: u64 = self.cluster_history.iter().map(|&c| c as u64).sum();
        ((sum as f64) / (self.cluster_history.len() as f64)).ceil() as u32
    }
    pub fn is_detected_now(&self) -> bool {
        self.detected_now
    }
    pub fn get_box_history(&self) -> &[Rect] {
        &self.box_history
    }
    pub fn get_blur_history(&self) -> &[bool] {
        &self.blur_history
    }
    pub fn get_cluster_history(&self) -> &[u32] {
        &self.cluster_history
    }
    pub fn get_class_votes(&self) -> &BTreeMap<u32, usize> {
        &self.class_votes
    }
    pub fn get_center_history(&self) -> Vec<Point> {
        self.center_history.to_vec()
    }
    pub fn center_history_len(&self) -> usize {
        self.center_history.len()
    }
    pub fn get_bbox(&self) -> Option<Rect> {
        self.box_history.last().copied()
    }
    pub fn to_display(&self) -> DisplayEntity {
        let bbox = self.get_bbox();
        DisplayEntity {
            kind: EntityKind::Large,
            track_id: self.track_id,
            class_id: self.majority_class(),
            bbox,
            position: bbox.map(|b| b.center()).unwrap_or_default(),
            trajectory: self.get_trajectory(),
        }
    }
}

impl Entity for LargeEntityRecord {
    fn get_track_id(&self) -> u64 {
        self.track_id
    }
    fn get_first_frame(&self) -> u64 {
        self.first_frame
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Large
    }
    fn get_survival(&self) -> i64 {
        self.survival
    }
    fn get_detection_sequence(&self) -> &[u8] {
        &self.detection_sequence
    }
    fn trim_trailing_misses(&mut self) {
        let length = cut_trailing_misses(&mut self.detection_sequence);
        self.box_history.truncate(length);
        self.blur_history.truncate(length);
        self.center_history.truncate(length);
    }
    fn get_trajectory(&self) -> Vec<Point> {
        self.center_history.thaw(&self.trajectory)
    }
}
