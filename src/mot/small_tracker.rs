use std::collections::{BTreeMap, BinaryHeap, HashSet};

use tracing::{debug, warn};

use crate::config::{SmallConfig, SpanTier};
use crate::mot::candidate_queue::MatchCandidate;
use crate::mot::entity::{DisplayEntity, Entity};
use crate::mot::{CandidatePoint, SmallEntityRecord};
use crate::utils::{euclidean_distance, Translation};

/// Tracker of small organisms: greedy nearest-candidate assignment of raw points
pub struct SmallEntityTracker {
    // Updates a record lives for. Default is 100
    survival: i64,
    // Consecutive misses after which a record is left out of matching. Default is 15
    missing_threshold: u32,
    // Max distance (pixels) for a match. Default is 120.0
    match_distance: f32,
    // Detections needed to be shown. Default is 3
    display_min_detections: usize,
    real_tiers: Vec<SpanTier>,
    // Last issued track id
    counter: u64,
    // Storage (ordered by id so every sweep is deterministic)
    objects: BTreeMap<u64, SmallEntityRecord>,
    // Ids matched on the last update
    matched_ids: Vec<u64>,
}

impl Default for SmallEntityTracker {
    fn default() -> Self {
        SmallEntityTracker::new(&SmallConfig::default())
    }
}

impl SmallEntityTracker {
    /// Creates new instance of SmallEntityTracker
    ///
    /// Basic usage:
    ///
    /// ```
    /// use fauna_rs::config::SmallConfig;
    /// use fauna_rs::mot::{CandidatePoint, SmallEntityTracker};
    /// let mut tracker = SmallEntityTracker::new(&SmallConfig::default());
    /// tracker.update(0, &[CandidatePoint::new(100.0, 100.0, 400.0)], None);
    /// assert_eq!(tracker.len(), 1);
    /// ```
    pub fn new(config: &SmallConfig) -> Self {
        SmallEntityTracker {
            survival: config.survival,
            missing_threshold: config.missing_threshold,
            match_distance: config.match_distance,
            display_min_detections: config.display_min_detections,
            real_tiers: config.real_tiers.clone(),
            counter: 0,
            objects: BTreeMap::new(),
            matched_ids: Vec::new(),
        }
    }
    // Matches new points to existing records
    pub fn update(&mut self, frame_index: u64, points: &[CandidatePoint], translation: Option<Translation>) {
        self.matched_ids.clear();
        let shift = Translation::or_zero(translation);

        let valid_points: Vec<usize> = points
            .iter()
            .enumerate()
            .filter_map(|(idx, point)| {
                if point.is_finite() {
                    Some(idx)
                } else {
                    warn!(frame_index, point_index = idx, "skipping non-finite candidate point");
                    None
                }
            })
            .collect();

        // Closest pairs first
        let mut priority_queue: BinaryHeap<MatchCandidate> = BinaryHeap::new();
        for (track_id, object) in self.objects.iter() {
            if object.is_missing() {
                continue;
            }
            let expected = object.get_reference_point().shifted(shift);
            for &point_index in valid_points.iter() {
                let distance = euclidean_distance(&expected, &points[point_index].position());
                if distance <= self.match_distance {
                    priority_queue.push(MatchCandidate::new(*track_id, point_index, distance));
                }
            }
        }

        // We need to prevent double usage of records and points
        let mut reserved_objects: HashSet<u64> = HashSet::new();
        let mut reserved_points: HashSet<usize> = HashSet::new();
        while let Some(candidate) = priority_queue.pop() {
            if reserved_objects.contains(&candidate.track_id) || reserved_points.contains(&candidate.point_index) {
                continue;
            }
            match self.objects.get_mut(&candidate.track_id) {
                Some(object) => {
                    object.update(&points[candidate.point_index], translation);
                    reserved_objects.insert(candidate.track_id);
                    reserved_points.insert(candidate.point_index);
                    self.matched_ids.push(candidate.track_id);
                }
                None => {
                    warn!(track_id = candidate.track_id, "candidate refers to unknown record, skipping");
                }
            }
        }

        // Records left without a point follow the camera
        for (track_id, object) in self.objects.iter_mut() {
            if !reserved_objects.contains(track_id) {
                object.update_translation(translation);
            }
        }

        // Otherwise register point as a new record
        for &point_index in valid_points.iter() {
            if reserved_points.contains(&point_index) {
                continue;
            }
            self.counter += 1;
            let track_id = self.counter;
            debug!(frame_index, track_id, "new small entity");
            self.objects.insert(
                track_id,
                SmallEntityRecord::new(track_id, &points[point_index], frame_index, self.survival, self.missing_threshold),
            );
        }
        self.matched_ids.sort_unstable();
    }
    /// Removes expired records and returns them trimmed to their last detection
    pub fn clear(&mut self) -> Vec<SmallEntityRecord> {
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
                debug!(track_id, detections = object.detections_count(), "small entity expired");
                cleared.push(object);
            }
        }
        self.matched_ids.retain(|id| self.objects.contains_key(id));
        cleared
    }
    /// Records matched on the last update that have enough detections to be shown
    pub fn display_tracks(&self) -> Vec<DisplayEntity> {
        self.matched_ids
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter(|object| object.is_displayable(self.display_min_detections))
            .map(|object| object.to_display())
            .collect()
    }
    /// Real-identity check with this tracker's thresholds
    pub fn is_real(&self, record: &SmallEntityRecord) -> bool {
        record.is_real(self.display_min_detections, &self.real_tiers)
    }
    pub fn get(&self, track_id: u64) -> Option<&SmallEntityRecord> {
        self.objects.get(&track_id)
    }
    pub fn len(&self) -> usize {
        self.objects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Point;

    fn pt(x: f32, y: f32) -> CandidatePoint {
        CandidatePoint::new(x, y, 100.0)
    }

    #[test]
    fn test_closer_record_wins() {
        let mut tracker = SmallEntityTracker::default();
        tracker.update(0, &[pt(100.0, 100.0), pt(310.0, 100.0)], None);
        assert_eq!(tracker.len(), 2);
        // 10 px from record 1, 200 px from record 2
        tracker.update(1, &[pt(110.0, 100.0)], None);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(1).unwrap().get_detection_sequence(), &[1, 1]);
        assert_eq!(tracker.get(2).unwrap().get_detection_sequence(), &[1, 0]);
        assert_eq!(tracker.get(2).unwrap().get_missing(), 1);
    }

    #[test]
    fn test_greedy_prefers_globally_closer_pair() {
        let mut tracker = SmallEntityTracker::default();
        tracker.update(0, &[pt(0.0, 0.0), pt(100.0, 0.0)], None);
        // Point at 60 is 60 from record 1 and 40 from record 2; point at 150 is 50 from record 2.
        // Record 2 takes the point at 60 first and record 1 is left with nothing in range.
        tracker.update(1, &[pt(60.0, 0.0), pt(150.0, 0.0)], None);
        assert_eq!(tracker.get(2).unwrap().get_reference_point(), Point::new(60.0, 0.0));
        assert_eq!(tracker.get(1).unwrap().get_missing(), 1);
        // Point at 150 became a new record
        assert_eq!(tracker.get(3).unwrap().get_reference_point(), Point::new(150.0, 0.0));
    }

    #[test]
    fn test_translation_adjusted_matching() {
        let mut tracker = SmallEntityTracker::new(&SmallConfig { match_distance: 20.0, ..SmallConfig::default() });
        tracker.update(0, &[pt(100.0, 100.0)], None);
        // Camera moved by 50 px, the organism did not
        tracker.update(1, &[pt(150.0, 100.0)], Some(Translation::new(50.0, 0.0)));
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get(1).unwrap().get_display_trajectory(),
            vec![Point::new(150.0, 100.0), Point::new(150.0, 100.0)]
        );
    }

    #[test]
    fn test_missing_records_are_not_matched() {
        let mut tracker = SmallEntityTracker::new(&SmallConfig { missing_threshold: 2, ..SmallConfig::default() });
        tracker.update(0, &[pt(100.0, 100.0)], None);
        tracker.update(1, &[], None);
        tracker.update(2, &[], None);
        assert!(tracker.get(1).unwrap().is_missing());
        tracker.update(3, &[pt(100.0, 100.0)], None);
        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(2).is_some());
    }

    #[test]
    fn test_display_needs_three_detections() {
        let mut tracker = SmallEntityTracker::default();
        tracker.update(0, &[pt(100.0, 100.0)], None);
        tracker.update(1, &[pt(105.0, 100.0)], None);
        assert!(tracker.display_tracks().is_empty());
        tracker.update(2, &[pt(110.0, 100.0)], None);
        let shown = tracker.display_tracks();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].position, Point::new(110.0, 100.0));
        // Not matched this cycle, not shown
        tracker.update(3, &[], None);
        assert!(tracker.display_tracks().is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut tracker = SmallEntityTracker::new(&SmallConfig { survival: 3, ..SmallConfig::default() });
        tracker.update(0, &[pt(100.0, 100.0)], None);
        tracker.update(1, &[pt(101.0, 100.0)], None);
        tracker.update(2, &[], None);
        assert!(tracker.clear().is_empty());
        tracker.update(3, &[], None);
        let cleared = tracker.clear();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].detection_bits(), "11");
        assert!(tracker.clear().is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let mut tracker = SmallEntityTracker::default();
        tracker.update(0, &[pt(f32::NAN, 1.0), pt(10.0, 10.0)], None);
        assert_eq!(tracker.len(), 1);
    }
}
