use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BigConfig, PresenceConfig, SmallConfig};
use crate::mot::entity::{Entity, EntityKind};
use crate::mot::{LargeEntityRecord, SmallEntityRecord};

/// Sliding-window existence check over a detection sequence.
///
/// The sequence is cut into windows of `window` frames; a window is "hit" when it
/// holds at least `frame_threshold` detections. The entity is present as soon as
/// `window_threshold` of any `windows` consecutive windows are hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceRule {
    pub window: usize,
    pub windows: usize,
    pub frame_threshold: usize,
    pub window_threshold: usize,
}

impl Default for PresenceRule {
    fn default() -> Self {
        PresenceRule {
            window: 10,
            windows: 5,
            frame_threshold: 6,
            window_threshold: 3,
        }
    }
}

impl PresenceRule {
    pub fn is_present(&self, detection_sequence: &[u8]) -> bool {
        if self.window == 0 || self.windows == 0 {
            return false;
        }
        let mut recent: VecDeque<bool> = VecDeque::with_capacity(self.windows);
        for chunk in detection_sequence.chunks(self.window) {
            let hits = chunk.iter().filter(|&&bit| bit == 1).count();
            recent.push_back(hits >= self.frame_threshold);
            if recent.len() == self.windows {
                if recent.iter().filter(|&&hit| hit).count() >= self.window_threshold {
                    return true;
                }
                recent.pop_front();
            }
        }
        false
    }
}

/// Finalized record of either kind
#[derive(Debug, Clone)]
pub enum FinishedRecord {
    Large(LargeEntityRecord),
    Small(SmallEntityRecord),
}

impl FinishedRecord {
    pub fn as_entity(&self) -> &dyn Entity {
        match self {
            FinishedRecord::Large(record) => record,
            FinishedRecord::Small(record) => record,
        }
    }
}

/// Expired record on its way to classification
#[derive(Debug, Clone)]
pub struct FinishedEntity {
    pub record: FinishedRecord,
    /// Class name for large entities, small label otherwise
    pub label: String,
    /// Passed the genuineness rules and was counted
    pub genuine: bool,
    pub finalized_at: DateTime<Utc>,
}

impl FinishedEntity {
    pub fn kind(&self) -> EntityKind {
        self.record.as_entity().kind()
    }
    pub fn track_id(&self) -> u64 {
        self.record.as_entity().get_track_id()
    }
    pub fn first_frame(&self) -> u64 {
        self.record.as_entity().get_first_frame()
    }
}

/// Running counts of genuine entities per label
pub struct Census {
    big: BigConfig,
    small: SmallConfig,
    presence: PresenceConfig,
    counts: BTreeMap<String, usize>,
}

impl Census {
    pub fn new(big: &BigConfig, small: &SmallConfig, presence: &PresenceConfig) -> Self {
        let mut counts: BTreeMap<String, usize> = big.class_names.iter().map(|name| (name.clone(), 0)).collect();
        counts.insert(small.label.clone(), 0);
        Census {
            big: big.clone(),
            small: small.clone(),
            presence: presence.clone(),
            counts,
        }
    }
    pub fn admit_large(&mut self, record: LargeEntityRecord) -> FinishedEntity {
        let label = match record.majority_class() {
            Some(class_id) => self.big.class_name(class_id),
            None => "unknown".to_string(),
        };
        let genuine = self
            .presence
            .rule_for(&label)
            .is_present(record.get_detection_sequence());
        self.finish(FinishedRecord::Large(record), label, genuine)
    }
    pub fn admit_small(&mut self, record: SmallEntityRecord) -> FinishedEntity {
        let genuine = record.is_real(self.small.display_min_detections, &self.small.real_tiers);
        let label = self.small.label.clone();
        self.finish(FinishedRecord::Small(record), label, genuine)
    }
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.counts.clone()
    }
    pub fn count(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }
    fn finish(&mut self, record: FinishedRecord, label: String, genuine: bool) -> FinishedEntity {
        if genuine {
            *self.counts.entry(label.clone()).or_insert(0) += 1;
        }
        debug!(track_id = record.as_entity().get_track_id(), label = %label, genuine, "entity finalized");
        FinishedEntity {
            record,
            label,
            genuine,
            finalized_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::mot::{Annotation, CandidatePoint};
    use crate::utils::Rect;

    #[test]
    fn test_presence_rule() {
        let rule = PresenceRule::default();
        // 5 windows with 3 full ones
        let mut seq = Vec::new();
        for full in [true, false, true, false, true] {
            seq.extend(std::iter::repeat(if full { 1 } else { 0 }).take(10));
        }
        assert!(rule.is_present(&seq));
        // Too short to ever fill 5 windows
        assert!(!rule.is_present(&[1; 40]));
        // Hits spread too thin
        let sparse: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 1 } else { 0 }).collect();
        assert!(!rule.is_present(&sparse));
    }

    #[test]
    fn test_census_counts_only_genuine() {
        let cfg = TrackingConfig::default();
        let mut census = Census::new(&cfg.big, &cfg.small, &cfg.presence);
        let mut record = LargeEntityRecord::new(3, 0, 200);
        for _ in 0..50 {
            record.update(&Rect::new(0.0, 0.0, 5.0, 5.0), &Annotation::new(5, 1), false, None);
        }
        let finished = census.admit_large(record);
        assert!(finished.genuine);
        assert_eq!(finished.label, "Ar");
        assert_eq!(finished.kind(), EntityKind::Large);

        let noise = SmallEntityRecord::new(1, &CandidatePoint::new(1.0, 1.0, 1.0), 4, 100, 15);
        let finished = census.admit_small(noise);
        assert!(!finished.genuine);
        assert_eq!(finished.first_frame(), 4);

        let counts = census.snapshot();
        assert_eq!(counts["Ar"], 1);
        assert_eq!(counts["SmallProtozoa"], 0);
        assert_eq!(counts["Mo"], 0);
    }
}
