//! Request DTOs.

use serde::{Deserialize, Serialize};

use sentinel_realtime::message::types::DEFAULT_LOGOUT_REASON;

/// Body of `POST /api/sessions/{user_id}/logout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Who is logging the user out.
    #[serde(default = "default_operator")]
    pub initiator: String,
    /// Why.
    #[serde(default = "default_reason")]
    pub reason: String,
}

impl Default for LogoutRequest {
    fn default() -> Self {
        Self {
            initiator: default_operator(),
            reason: default_reason(),
        }
    }
}

/// Body of `POST /api/reauth/{user_id}/challenge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Shown to the user.
    pub reason: String,
}

fn default_operator() -> String {
    "Operator".to_string()
}

fn default_reason() -> String {
    DEFAULT_LOGOUT_REASON.to_string()
}
