//! What to do when challenges keep failing.

use std::fmt::Debug;

use sentinel_core::types::UserId;

use super::state::ChallengeOutcome;

/// Initiator recorded on logouts the hub forces by itself.
pub const ESCALATION_INITIATOR: &str = "Security Sentinel";

/// Decision returned by an [`EscalationPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationAction {
    /// Do nothing beyond notifying the user.
    None,
    /// Terminate every session of the user.
    ForceLogout {
        /// Reason recorded on the `LOGOUT_ALL`.
        reason: String,
    },
}

/// Consulted after every failed or expired challenge.
pub trait EscalationPolicy: Debug + Send + Sync + 'static {
    /// Decide how to react to `consecutive_failures` failures in a row.
    fn on_failure(
        &self,
        user_id: &UserId,
        outcome: ChallengeOutcome,
        consecutive_failures: u32,
    ) -> EscalationAction;
}

/// Forces a global logout once failures reach a threshold.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEscalation {
    max_failures: u32,
}

impl ThresholdEscalation {
    /// `max_failures == 0` never escalates.
    pub fn new(max_failures: u32) -> Self {
        Self { max_failures }
    }
}

impl EscalationPolicy for ThresholdEscalation {
    fn on_failure(
        &self,
        _user_id: &UserId,
        outcome: ChallengeOutcome,
        consecutive_failures: u32,
    ) -> EscalationAction {
        if self.max_failures == 0 || consecutive_failures < self.max_failures {
            return EscalationAction::None;
        }
        let what = match outcome {
            ChallengeOutcome::Expired => "expired",
            _ => "failed",
        };
        EscalationAction::ForceLogout {
            reason: format!(
                "Reauthentication {what} {consecutive_failures} times in a row"
            ),
        }
    }
}
