//! Join-time risk scoring from registry state.

use std::time::Duration;

use sentinel_core::config::DetectorConfig;
use sentinel_core::types::UserId;

use super::event::{RiskClass, RiskEvent, RiskStatus, classify};

const CONCURRENCY_WEIGHT: f64 = 30.0;
const RAPID_SWITCH_WEIGHT: f64 = 20.0;
const ABNORMAL_HOUR_WEIGHT: f64 = 15.0;

/// What the hub knows about a join when it is accepted.
#[derive(Debug, Clone)]
pub struct JoinContext {
    /// Sessions the user has, the new one included.
    pub session_count: usize,
    /// Time since the user's previous join.
    pub since_previous_join: Option<Duration>,
    /// Local wall-clock hour of the join, 0-23.
    pub local_hour: u32,
}

/// Scores joins for concurrency, rapid app switching and odd hours.
#[derive(Debug, Clone)]
pub struct JoinRiskDetector {
    config: DetectorConfig,
}

impl JoinRiskDetector {
    /// Creates a detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Score a join. Returns `None` when disabled or nothing contributed.
    pub fn assess(&self, user_id: &UserId, app_name: &str, ctx: &JoinContext) -> Option<RiskEvent> {
        if !self.config.enabled {
            return None;
        }

        let mut score = 0.0;
        let mut reasons = Vec::new();

        if ctx.session_count > self.config.concurrency_threshold {
            score += CONCURRENCY_WEIGHT;
            reasons.push(format!(
                "High Concurrency: {} Active Sessions (+30)",
                ctx.session_count
            ));
        }

        if self.is_abnormal_hour(ctx.local_hour) {
            score += ABNORMAL_HOUR_WEIGHT;
            reasons.push(format!("Abnormal Login Time: {}:00 (+15)", ctx.local_hour));
        }

        if let Some(gap) = ctx.since_previous_join {
            if gap < Duration::from_secs(self.config.rapid_switch_seconds) {
                score += RAPID_SWITCH_WEIGHT;
                reasons.push(format!(
                    "Rapid App Switching: {}s interval (+20)",
                    gap.as_secs()
                ));
            }
        }

        if reasons.is_empty() {
            return None;
        }

        // The detector only observes; it never claims a session was killed.
        let status = if classify(score) >= RiskClass::Warn {
            RiskStatus::Warn
        } else {
            RiskStatus::Ok
        };

        Some(RiskEvent {
            user_id: user_id.clone(),
            app_name: app_name.to_string(),
            score,
            status,
            reasons,
            timestamp: chrono::Utc::now(),
        })
    }

    fn is_abnormal_hour(&self, hour: u32) -> bool {
        let (start, end) = (self.config.abnormal_hours_start, self.config.abnormal_hours_end);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}
