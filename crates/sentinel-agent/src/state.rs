//! Agent connection state and status reporting.

use std::fmt;

use serde::{Deserialize, Serialize};

use sentinel_core::types::ChallengeId;
use sentinel_realtime::reauth::ChallengeOutcome;

/// Lifecycle of the agent's link to the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport being established.
    Connecting,
    /// Transport up, join sent but not acknowledged.
    Connected,
    /// Join acknowledged; heartbeats running.
    Joined,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Joined => write!(f, "joined"),
        }
    }
}

/// Why the agent stopped for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// The local user logged out.
    LocalLogout,
    /// The hub ended every session of the user.
    GlobalLogout {
        /// Who initiated it.
        initiator: String,
        /// Why.
        reason: String,
    },
    /// A reauthentication challenge failed or expired.
    ReauthFailed {
        /// Which.
        outcome: ChallengeOutcome,
    },
    /// Reconnect attempts were exhausted.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// A challenge the user has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChallenge {
    /// Challenge ID.
    pub challenge_id: ChallengeId,
    /// Why it was issued.
    pub reason: String,
    /// Seconds the hub gave to answer.
    pub expires_in_seconds: u64,
}

/// Observable agent status, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Consecutive failed connection attempts.
    pub reconnect_attempts: u32,
    /// Set once reconnecting stopped; the status stays disconnected.
    pub gave_up: bool,
    /// Most recent transport error.
    pub last_error: Option<String>,
    /// Outstanding reauthentication challenge.
    pub pending_challenge: Option<PendingChallenge>,
    /// Set when the agent has stopped.
    pub exit: Option<ExitReason>,
}
