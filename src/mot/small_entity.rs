use itertools::{Itertools, MinMaxResult};

use crate::config::SpanTier;
use crate::mot::entity::{cut_trailing_misses, DisplayEntity, Entity, EntityKind};
use crate::utils::{DriftTrack, FrozenTrack, Point, Translation};

/// Raw motion candidate: position and area of a changed region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePoint {
    pub x: f32,
    pub y: f32,
    pub area: f32,
}

impl CandidatePoint {
    pub fn new(x: f32, y: f32, area: f32) -> Self {
        CandidatePoint { x, y, area }
    }
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.area.is_finite()
    }
}

/// Lifecycle record of a small organism tracked from raw points
#[derive(Debug, Clone)]
pub struct SmallEntityRecord {
    track_id: u64,
    start_frame: u64,
    survival: i64,
    missing: u32,
    missing_threshold: u32,
    // Last detected position, extrapolated with camera motion while missing
    reference_point: Point,
    area_history: Vec<f32>,
    detection_sequence: Vec<u8>,
    real_points: Vec<Point>,
    display_trajectory: DriftTrack,
    trajectory: FrozenTrack,
}

impl SmallEntityRecord {
    pub fn new(_track_id: u64, candidate: &CandidatePoint, _start_frame: u64, _survival: i64, _missing_threshold: u32) -> Self {
        let position = candidate.position();
        let display_trajectory = DriftTrack::with_point(position);
        let trajectory = display_trajectory.freeze();
        SmallEntityRecord {
            track_id: _track_id,
            start_frame: _start_frame,
            survival: _survival,
            missing: 0,
            missing_threshold: _missing_threshold,
            reference_point: position,
            area_history: vec![candidate.area],
            detection_sequence: vec![1],
            real_points: vec![position],
            display_trajectory,
            trajectory,
        }
    }
    /// Update with the point matched to this record
    pub fn update(&mut self, candidate: &CandidatePoint, translation: Option<Translation>) {
        self.survival -= 1;
        self.display_trajectory.shift(Translation::or_zero(translation));
        let position = candidate.position();
        self.detection_sequence.push(1);
        self.real_points.push(position);
        self.reference_point = position;
        self.area_history.push(candidate.area);
        self.display_trajectory.push(position);
        self.trajectory = self.display_trajectory.freeze();
        self.missing = 0;
    }
    /// Update on a cycle without a matched point
    pub fn update_translation(&mut self, translation: Option<Translation>) {
        self.survival -= 1;
        let translation = Translation::or_zero(translation);
        self.display_trajectory.shift(translation);
        self.detection_sequence.push(0);
        if self.missing < self.missing_threshold {
            self.reference_point = self.reference_point.shifted(translation);
            self.missing += 1;
        }
        self.display_trajectory.push(self.reference_point);
    }
    /// Lost for too long to take part in matching
    pub fn is_missing(&self) -> bool {
        self.missing >= self.missing_threshold
    }
    pub fn get_missing(&self) -> u32 {
        self.missing
    }
    pub fn get_reference_point(&self) -> Point {
        self.reference_point
    }
    pub fn is_displayable(&self, min_detections: usize) -> bool {
        self.detections_count() >= min_detections
    }
    /// Vertical extent of the display trajectory without its last point.
    /// Infinite when fewer than two points remain.
    pub fn span(&self) -> f32 {
        let points = self.display_trajectory.to_vec();
        if points.len() <= 2 {
            return f32::INFINITY;
        }
        match points[..points.len() - 1].iter().map(|p| p.y).minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::MinMax(min, max) => max - min,
            _ => f32::INFINITY,
        }
    }
    /// Whether the record looks like an organism rather than noise
    pub fn is_real(&self, min_detections: usize, tiers: &[SpanTier]) -> bool {
        let detections = self.detections_count();
        if self.angular_velocity() <= 0.0 || detections < min_detections {
            return false;
        }
        let span = self.span();
        tiers
            .iter()
            .any(|tier| detections > tier.more_than && span <= tier.max_span)
    }
    pub fn mean_area(&self) -> f32 {
        if self.area_history.is_empty() {
            return 0.0;
        }
        self.area_history.iter().sum::<f32>() / self.area_history.len() as f32
    }
    pub fn get_area_history(&self) -> &[f32] {
        &self.area_history
    }
    pub fn get_real_points(&self) -> &[Point] {
        &self.real_points
    }
    pub fn get_display_trajectory(&self) -> Vec<Point> {
        self.display_trajectory.to_vec()
    }
    pub fn to_display(&self) -> DisplayEntity {
        DisplayEntity {
            kind: EntityKind::Small,
            track_id: self.track_id,
            class_id: None,
            bbox: None,
            position: self.display_trajectory.last().unwrap_or(self.reference_point),
            trajectory: self.get_display_trajectory(),
        }
    }
}

impl Entity for SmallEntityRecord {
    fn get_track_id(&self) -> u64 {
        self.track_id
    }
    fn get_first_frame(&self) -> u64 {
        self.start_frame
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Small
    }
    fn get_survival(&self) -> i64 {
        self.survival
    }
    fn get_detection_sequence(&self) -> &[u8] {
        &self.detection_sequence
    }
    fn trim_trailing_misses(&mut self) {
        let length = cut_trailing_misses(&mut self.detection_sequence);
        self.display_trajectory.truncate(length);
    }
    fn get_trajectory(&self) -> Vec<Point> {
        self.display_trajectory.thaw(&self.trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmallConfig;

    fn record_at(x: f32, y: f32) -> SmallEntityRecord {
        SmallEntityRecord::new(1, &CandidatePoint::new(x, y, 100.0), 0, 100, 15)
    }

    #[test]
    fn test_display_eligibility() {
        let mut record = record_at(10.0, 10.0);
        record.update(&CandidatePoint::new(12.0, 12.0, 100.0), None);
        assert!(!record.is_displayable(3));
        record.update(&CandidatePoint::new(14.0, 14.0, 100.0), None);
        assert!(record.is_displayable(3));
    }

    #[test]
    fn test_missing_counter() {
        let mut record = SmallEntityRecord::new(1, &CandidatePoint::new(0.0, 0.0, 1.0), 0, 100, 2);
        record.update_translation(Some(Translation::new(5.0, 0.0)));
        assert_eq!(record.get_reference_point(), Point::new(5.0, 0.0));
        record.update_translation(Some(Translation::new(5.0, 0.0)));
        assert!(record.is_missing());
        // Reference point is no longer extrapolated once missing
        record.update_translation(Some(Translation::new(5.0, 0.0)));
        assert_eq!(record.get_reference_point(), Point::new(10.0, 0.0));
        assert_eq!(record.get_missing(), 2);
        record.update(&CandidatePoint::new(11.0, 1.0, 1.0), None);
        assert_eq!(record.get_missing(), 0);
        assert!(!record.is_missing());
    }

    #[test]
    fn test_trim_trailing_misses() {
        let mut record = record_at(0.0, 0.0);
        record.update(&CandidatePoint::new(3.0, 4.0, 1.0), None);
        for _ in 0..3 {
            record.update_translation(Some(Translation::new(1.0, 1.0)));
        }
        assert_eq!(record.detection_bits(), "11000");
        record.trim_trailing_misses();
        assert_eq!(record.get_detection_sequence().len(), 2);
        assert_eq!(record.get_display_trajectory().len(), 2);
        assert_eq!(record.get_trajectory(), vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0)]);
    }

    #[test]
    fn test_real_identity_filter() {
        let cfg = SmallConfig::default();
        // Zig-zag inside a narrow band
        let mut record = record_at(0.0, 0.0);
        for (x, y) in [(10.0, 10.0), (20.0, 0.0), (30.0, 10.0)] {
            record.update(&CandidatePoint::new(x, y, 50.0), None);
        }
        assert!(record.angular_velocity() > 0.0);
        assert_eq!(record.span(), 10.0);
        assert!(record.is_real(cfg.display_min_detections, &cfg.real_tiers));

        // Straight line never counts as an organism
        let mut straight = record_at(0.0, 0.0);
        for x in [10.0, 20.0, 30.0] {
            straight.update(&CandidatePoint::new(x, 0.0, 50.0), None);
        }
        assert!(!straight.is_real(cfg.display_min_detections, &cfg.real_tiers));

        // Same for a diagonal walked with unequal steps
        let mut diagonal = record_at(0.0, 0.0);
        for (x, y) in [(1.0, 1.0), (3.0, 3.0), (4.0, 4.0)] {
            diagonal.update(&CandidatePoint::new(x, y, 50.0), None);
        }
        assert_eq!(diagonal.angular_velocity(), 0.0);
        assert!(!diagonal.is_real(cfg.display_min_detections, &cfg.real_tiers));

        // Too few detections
        let mut short = record_at(0.0, 0.0);
        short.update(&CandidatePoint::new(10.0, 10.0, 50.0), None);
        assert!(!short.is_real(cfg.display_min_detections, &cfg.real_tiers));
    }

    #[test]
    fn test_wide_span_needs_more_detections() {
        let cfg = SmallConfig::default();
        let mut record = record_at(0.0, 0.0);
        for (x, y) in [(10.0, 100.0), (20.0, 0.0), (30.0, 100.0)] {
            record.update(&CandidatePoint::new(x, y, 50.0), None);
        }
        assert_eq!(record.span(), 100.0);
        assert!(!record.is_real(cfg.display_min_detections, &cfg.real_tiers));
        for (x, y) in [(40.0, 0.0), (50.0, 100.0), (60.0, 0.0)] {
            record.update(&CandidatePoint::new(x, y, 50.0), None);
        }
        assert!(record.is_real(cfg.display_min_detections, &cfg.real_tiers));
    }

    #[test]
    fn test_mean_area() {
        let mut record = record_at(0.0, 0.0);
        record.update(&CandidatePoint::new(1.0, 1.0, 300.0), None);
        assert_eq!(record.mean_area(), 200.0);
    }
}
