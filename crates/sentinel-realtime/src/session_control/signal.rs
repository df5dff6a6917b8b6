//! Control signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::types::UserId;

/// Fire-and-forget instruction to terminate a user's sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSignal {
    /// Target user.
    pub user_id: UserId,
    /// Who initiated it.
    pub initiator: String,
    /// Why.
    pub reason: String,
    /// When it was issued.
    pub timestamp: DateTime<Utc>,
}

impl ControlSignal {
    /// Stamp a new signal with the current time.
    pub fn new(user_id: UserId, initiator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            user_id,
            initiator: initiator.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
