//! Risk events and score classification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::error::AppError;
use sentinel_core::types::UserId;

/// Status a telemetry producer assigned to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskStatus {
    /// Nothing suspicious.
    Ok,
    /// Suspicious activity observed.
    Warn,
    /// The producer terminated the user's access.
    Killed,
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warn => write!(f, "WARN"),
            Self::Killed => write!(f, "KILLED"),
        }
    }
}

/// Advisory classification of a score. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Score of 50 or below.
    Ok,
    /// Score above 50, up to 80.
    Warn,
    /// Score above 80; termination would be justified.
    KillEligible,
}

/// Classify a score. Advisory only: nothing is enforced from it directly.
pub fn classify(score: f64) -> RiskClass {
    if score > 80.0 {
        RiskClass::KillEligible
    } else if score > 50.0 {
        RiskClass::Warn
    } else {
        RiskClass::Ok
    }
}

/// One piece of risk telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    /// Subject user.
    pub user_id: UserId,
    /// Application the event concerns.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Producer-assigned score.
    pub score: f64,
    /// Producer-assigned status.
    pub status: RiskStatus,
    /// Contributing reasons, most significant first.
    #[serde(default)]
    pub reasons: Vec<String>,
    /// When the event was produced.
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RiskEvent {
    /// Reject events that cannot be aggregated.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_id.is_empty() {
            return Err(AppError::validation("user_id must not be empty"));
        }
        if !self.score.is_finite() {
            return Err(AppError::validation("score must be a finite number"));
        }
        Ok(())
    }
}

fn default_app_name() -> String {
    crate::message::types::DEFAULT_APP_NAME.to_string()
}
