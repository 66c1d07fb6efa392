use serde::{Deserialize, Serialize};

use crate::utils::{kinematics, Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Externally tracked organism (box + track id from the neural detector)
    Large,
    /// Organism tracked here from raw motion points
    Small,
}

/// Common interface of the lifecycle records.
///
/// Implementations:
/// - `LargeEntityRecord` - history of an externally tracked box
/// - `SmallEntityRecord` - history of a point matched by `SmallEntityTracker`
pub trait Entity {
    /* Identity */
    fn get_track_id(&self) -> u64;
    fn get_first_frame(&self) -> u64;
    fn kind(&self) -> EntityKind;
    /* Lifecycle */
    fn get_survival(&self) -> i64;
    fn is_expired(&self) -> bool {
        self.get_survival() <= 0
    }
    fn get_detection_sequence(&self) -> &[u8];
    /// Cuts every parallel history right after the last real detection
    fn trim_trailing_misses(&mut self);
    /* Motion */
    fn get_trajectory(&self) -> Vec<Point>;

    fn detections_count(&self) -> usize {
        self.get_detection_sequence().iter().filter(|&&bit| bit == 1).count()
    }
    /// Detection sequence as a string of '0' and '1'
    fn detection_bits(&self) -> String {
        self.get_detection_sequence()
            .iter()
            .map(|&bit| if bit == 1 { '1' } else { '0' })
            .collect()
    }
    fn linear_velocity(&self) -> f32 {
        kinematics::linear_velocity(&self.get_trajectory())
    }
    fn angular_velocity(&self) -> f32 {
        kinematics::angular_velocity(&self.get_trajectory())
    }
    fn speed_profile(&self) -> (Vec<f32>, Vec<f32>) {
        kinematics::speed_profile(&self.get_trajectory())
    }
}

/// What the render stage needs to draw one entity
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEntity {
    pub kind: EntityKind,
    pub track_id: u64,
    /// Majority class (large entities only)
    pub class_id: Option<u32>,
    /// Current box of a large entity
    pub bbox: Option<Rect>,
    /// Current position (box center for large entities)
    pub position: Point,
    pub trajectory: Vec<Point>,
}

/// Pops trailing zeros and returns the remaining length
pub(crate) fn cut_trailing_misses(detection_sequence: &mut Vec<u8>) -> usize {
    while detection_sequence.last() == Some(&0) {
        detection_sequence.pop();
    }
    detection_sequence.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_trailing_misses() {
        let mut seq = vec![1, 1, 0, 0, 0];
        assert_eq!(cut_trailing_misses(&mut seq), 2);
        assert_eq!(seq, vec![1, 1]);
        let mut seq = vec![1, 0, 1];
        assert_eq!(cut_trailing_misses(&mut seq), 3);
        let mut seq = vec![0, 0];
        assert_eq!(cut_trailing_misses(&mut seq), 0);
    }
}
