//! Tunable thresholds of the trackers and the pipeline, loadable from TOML
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mot::PresenceRule;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Whole configuration of a run. Every section falls back to defaults when absent.
///
/// ```
/// use fauna_rs::TrackingConfig;
/// let cfg = TrackingConfig::from_toml_str("[small]\nmatch_distance = 80.0").unwrap();
/// assert_eq!(cfg.small.match_distance, 80.0);
/// assert_eq!(cfg.big.survival, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub big: BigConfig,
    pub small: SmallConfig,
    pub region: RegionConfig,
    pub sync: SyncConfig,
    pub presence: PresenceConfig,
}

/// Large entities (externally tracked)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigConfig {
    /// Number of updates a record lives for
    pub survival: i64,
    /// Screenshot is refreshed while the record has at most this many detections
    pub screenshot_cutoff: usize,
    /// Class id -> short name
    pub class_names: Vec<String>,
}

impl Default for BigConfig {
    fn default() -> Self {
        BigConfig {
            survival: 200,
            screenshot_cutoff: 30,
            class_names: ["Gs", "Mo", "Do", "Eu", "Ne", "Ar"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl BigConfig {
    pub fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("cls{}", class_id))
    }
}

/// One rung of the small-entity genuineness ladder:
/// more than `more_than` detections and a vertical span of at most `max_span`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanTier {
    pub more_than: usize,
    pub max_span: f32,
}

/// Small entities (tracked here from raw points)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmallConfig {
    pub survival: i64,
    /// Consecutive misses after which a record stops taking part in matching
    pub missing_threshold: u32,
    /// Max distance (pixels) between a record and a point to be matched
    pub match_distance: f32,
    pub display_min_detections: usize,
    /// Label used for small entities in counts
    pub label: String,
    pub real_tiers: Vec<SpanTier>,
}

impl Default for SmallConfig {
    fn default() -> Self {
        SmallConfig {
            survival: 100,
            missing_threshold: 15,
            match_distance: 120.0,
            display_min_detections: 3,
            label: "SmallProtozoa".to_string(),
            real_tiers: vec![
                SpanTier { more_than: 2, max_span: 50.0 },
                SpanTier { more_than: 5, max_span: 150.0 },
                SpanTier { more_than: 20, max_span: 500.0 },
            ],
        }
    }
}

/// Circle on screen where points are always noise (dust on the lens)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseZone {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub survival: i64,
    /// Pixels added around every large-entity box
    pub offset: f32,
    /// Pixels cut at the left and right screen borders
    pub edge: f32,
    pub frame_width: f32,
    pub frame_height: f32,
    pub noise_zones: Vec<NoiseZone>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        RegionConfig {
            survival: 80,
            offset: 5.0,
            edge: 10.0,
            frame_width: 1824.0,
            frame_height: 1216.0,
            noise_zones: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Hold a lone item until the other stream is finished
    pub strict_ordering: bool,
    /// Every n-th frame goes to the small detector
    pub small_stream_stride: u64,
    pub idle_backoff_ms: u64,
    /// Items per second the watchdog expects the backlog to drain at
    pub watchdog_drain_rate: f32,
    pub watchdog_min_grace_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            strict_ordering: true,
            small_stream_stride: 2,
            idle_backoff_ms: 1,
            watchdog_drain_rate: 10.0,
            watchdog_min_grace_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub default: PresenceRule,
    /// Overrides keyed by class name
    pub per_class: BTreeMap<String, PresenceRule>,
}

impl PresenceConfig {
    pub fn rule_for(&self, class_name: &str) -> &PresenceRule {
        self.per_class.get(class_name).unwrap_or(&self.default)
    }
}

impl TrackingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: TrackingConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.big.survival <= 0 || self.small.survival <= 0 || self.region.survival <= 0 {
            return Err(ConfigError::Invalid("survival counters must be positive".to_string()));
        }
        if self.small.match_distance.is_nan() || self.small.match_distance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "small.match_distance must be positive, got {}",
                self.small.match_distance
            )));
        }
        if self.sync.small_stream_stride == 0 {
            return Err(ConfigError::Invalid("sync.small_stream_stride must be at least 1".to_string()));
        }
        if self.sync.watchdog_drain_rate.is_nan() || self.sync.watchdog_drain_rate <= 0.0 {
            return Err(ConfigError::Invalid("sync.watchdog_drain_rate must be positive".to_string()));
        }
        if self.region.frame_width <= 2.0 * self.region.edge {
            return Err(ConfigError::Invalid(format!(
                "region.frame_width {} leaves nothing between edges of {}",
                self.region.frame_width, self.region.edge
            )));
        }
        let rules = std::iter::once(&self.presence.default).chain(self.presence.per_class.values());
        for rule in rules {
            if rule.window == 0 || rule.windows == 0 {
                return Err(ConfigError::Invalid("presence windows must be non-empty".to_string()));
            }
        }
        Ok(())
    }
}
