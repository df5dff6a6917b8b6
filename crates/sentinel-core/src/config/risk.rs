//! Risk aggregation and join-time detector configuration.

use serde::{Deserialize, Serialize};

/// Risk aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Capacity of the in-memory activity feed (oldest evicted first).
    #[serde(default = "default_activity_capacity")]
    pub activity_log_capacity: usize,
    /// Broadcast buffer for snapshot subscribers.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Issue a reauthentication challenge for events classified WARN or above.
    #[serde(default = "default_true")]
    pub auto_challenge: bool,
    /// Join-time risk detector.
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            activity_log_capacity: default_activity_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
            auto_challenge: true,
            detector: DetectorConfig::default(),
        }
    }
}

/// Scores a join from registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Whether joins are scored at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sessions above this count add the concurrency weight.
    #[serde(default = "default_concurrency_threshold")]
    pub concurrency_threshold: usize,
    /// Joins closer than this to the previous join count as a rapid switch.
    #[serde(default = "default_rapid_switch")]
    pub rapid_switch_seconds: u64,
    /// First hour (local, 0-23) of the abnormal window.
    #[serde(default = "default_abnormal_start")]
    pub abnormal_hours_start: u32,
    /// Hour (local, 0-23) the abnormal window ends, exclusive.
    #[serde(default = "default_abnormal_end")]
    pub abnormal_hours_end: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency_threshold: default_concurrency_threshold(),
            rapid_switch_seconds: default_rapid_switch(),
            abnormal_hours_start: default_abnormal_start(),
            abnormal_hours_end: default_abnormal_end(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_activity_capacity() -> usize {
    50
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_concurrency_threshold() -> usize {
    3
}

fn default_rapid_switch() -> u64 {
    10
}

fn default_abnormal_start() -> u32 {
    23
}

fn default_abnormal_end() -> u32 {
    5
}
