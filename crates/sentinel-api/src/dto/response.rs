//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::types::UserId;
use sentinel_realtime::reauth::{Challenge, IssueOutcome};
use sentinel_realtime::registry::SessionInfo;
use sentinel_realtime::risk::RiskClass;
use sentinel_realtime::session_control::BroadcastReport;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the hub answers.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Attached transports.
    pub connections: usize,
    /// Registered sessions.
    pub sessions: usize,
    /// Users online.
    pub users: usize,
}

/// `GET /api/sessions/{user_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    /// User.
    pub user_id: UserId,
    /// Open sessions, oldest first.
    pub sessions: Vec<SessionInfo>,
}

/// `POST /api/sessions/{user_id}/logout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// User.
    pub user_id: UserId,
    /// Delivery counts.
    #[serde(flatten)]
    pub report: BroadcastReport,
}

/// `POST /api/risk/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Subject user.
    pub user_id: UserId,
    /// How the score classified.
    pub class: RiskClass,
}

/// `POST /api/reauth/{user_id}/challenge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// User.
    pub user_id: UserId,
    /// `issued`, `already_pending` or `in_grace_period`.
    pub outcome: String,
    /// The pending challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Challenge>,
    /// End of the grace period that suppressed the challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_until: Option<DateTime<Utc>>,
}

impl ChallengeResponse {
    /// Render an issue outcome.
    pub fn from_outcome(user_id: UserId, outcome: IssueOutcome) -> Self {
        let (outcome, challenge, grace_until) = match outcome {
            IssueOutcome::Issued(c) => ("issued", Some(c), None),
            IssueOutcome::AlreadyPending(c) => ("already_pending", Some(c), None),
            IssueOutcome::InGracePeriod { until } => ("in_grace_period", None, Some(until)),
        };
        Self {
            user_id,
            outcome: outcome.to_string(),
            challenge,
            grace_until,
        }
    }
}
