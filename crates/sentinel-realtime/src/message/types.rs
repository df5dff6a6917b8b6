//! Inbound and outbound message type definitions.
//!
//! Frames are JSON objects tagged by an `event` field. Client-to-hub events
//! use lower snake case (`join`, `verify_password`); hub-to-client events
//! use the upper case names agents already listen for (`LOGOUT_ALL`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::types::{ChallengeId, UserId};

use crate::reauth::ChallengeOutcome;
use crate::risk::{RiskEvent, RiskStatus};
use crate::session_control::ControlSignal;

/// Application name used when a join omits one.
pub const DEFAULT_APP_NAME: &str = "Unknown App";

/// Reason used when a global logout request omits one.
pub const DEFAULT_LOGOUT_REASON: &str = "Manual Global Logout";

/// Initiator used when a global logout request omits one.
pub const DEFAULT_INITIATOR: &str = "Unknown";

/// Messages sent by an agent to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Register this channel as a session of `user_id`.
    Join {
        /// User the channel belongs to.
        user_id: UserId,
        /// Branded application name.
        #[serde(default = "default_app_name")]
        app_name: String,
    },
    /// Liveness refresh.
    Heartbeat {
        /// User the channel joined as.
        user_id: UserId,
    },
    /// Ask the hub to terminate every session of `user_id`.
    ForceGlobalLogout {
        /// Target user.
        user_id: UserId,
        /// Human-readable reason.
        #[serde(default = "default_reason")]
        reason: String,
        /// Who asked.
        #[serde(default = "default_initiator")]
        initiator: String,
    },
    /// Answer a reauthentication challenge.
    VerifyPassword {
        /// User the channel joined as.
        user_id: UserId,
        /// Secret forwarded to the identity provider.
        password: String,
    },
    /// End this channel's session without closing the transport.
    Leave {
        /// User the channel joined as.
        user_id: UserId,
    },
}

impl InboundMessage {
    /// The user the message claims to act for.
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Join { user_id, .. }
            | Self::Heartbeat { user_id }
            | Self::ForceGlobalLogout { user_id, .. }
            | Self::VerifyPassword { user_id, .. }
            | Self::Leave { user_id } => user_id,
        }
    }

    /// Event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Heartbeat { .. } => "heartbeat",
            Self::ForceGlobalLogout { .. } => "force_global_logout",
            Self::VerifyPassword { .. } => "verify_password",
            Self::Leave { .. } => "leave",
        }
    }
}

/// Messages sent by the hub to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundMessage {
    /// Join acknowledged.
    #[serde(rename = "JOINED")]
    Joined {
        /// User joined as.
        user_id: UserId,
        /// Application name recorded.
        app_name: String,
        /// Sessions the user has open, this one included.
        session_count: usize,
    },
    /// Every session of the user must tear down.
    #[serde(rename = "LOGOUT_ALL")]
    LogoutAll {
        /// Target user.
        user_id: UserId,
        /// Who initiated the logout.
        initiator: String,
        /// Why.
        reason: String,
        /// When the hub issued the signal.
        timestamp: DateTime<Utc>,
    },
    /// Risk telemetry for operator channels.
    #[serde(rename = "RISK_UPDATE")]
    RiskUpdate {
        /// Subject user.
        user_id: UserId,
        /// Application the event came from.
        app_name: String,
        /// Producer-assigned score.
        score: f64,
        /// Producer-assigned status.
        status: RiskStatus,
        /// Ordered contributing reasons.
        reasons: Vec<String>,
        /// When the event was produced.
        timestamp: DateTime<Utc>,
    },
    /// The user must re-enter their password.
    #[serde(rename = "REQUIRE_REAUTH")]
    RequireReauth {
        /// Challenged user.
        user_id: UserId,
        /// Challenge being answered.
        challenge_id: ChallengeId,
        /// Why the challenge was issued.
        reason: String,
        /// Seconds until the challenge expires.
        expires_in_seconds: u64,
    },
    /// Verification succeeded.
    #[serde(rename = "REAUTH_SUCCESS")]
    ReauthSuccess {
        /// Verified user.
        user_id: UserId,
        /// Display text.
        message: String,
    },
    /// Verification failed or the challenge expired.
    #[serde(rename = "REAUTH_FAILED")]
    ReauthFailed {
        /// Challenged user.
        user_id: UserId,
        /// `failed` or `expired`.
        outcome: ChallengeOutcome,
        /// Display text.
        message: String,
    },
    /// A request could not be honoured.
    #[serde(rename = "ERROR")]
    Error {
        /// Machine-readable code.
        code: String,
        /// Description.
        message: String,
    },
}

impl OutboundMessage {
    /// The user a targeted message is meant for, if any.
    ///
    /// Agents discard targeted messages addressed to someone else.
    pub fn target_user(&self) -> Option<&UserId> {
        match self {
            Self::Joined { user_id, .. }
            | Self::LogoutAll { user_id, .. }
            | Self::RequireReauth { user_id, .. }
            | Self::ReauthSuccess { user_id, .. }
            | Self::ReauthFailed { user_id, .. } => Some(user_id),
            Self::RiskUpdate { .. } | Self::Error { .. } => None,
        }
    }

    /// Event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "JOINED",
            Self::LogoutAll { .. } => "LOGOUT_ALL",
            Self::RiskUpdate { .. } => "RISK_UPDATE",
            Self::RequireReauth { .. } => "REQUIRE_REAUTH",
            Self::ReauthSuccess { .. } => "REAUTH_SUCCESS",
            Self::ReauthFailed { .. } => "REAUTH_FAILED",
            Self::Error { .. } => "ERROR",
        }
    }

    /// Build an `ERROR` frame.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ControlSignal> for OutboundMessage {
    fn from(signal: &ControlSignal) -> Self {
        Self::LogoutAll {
            user_id: signal.user_id.clone(),
            initiator: signal.initiator.clone(),
            reason: signal.reason.clone(),
            timestamp: signal.timestamp,
        }
    }
}

impl From<&RiskEvent> for OutboundMessage {
    fn from(event: &RiskEvent) -> Self {
        Self::RiskUpdate {
            user_id: event.user_id.clone(),
            app_name: event.app_name.clone(),
            score: event.score,
            status: event.status,
            reasons: event.reasons.clone(),
            timestamp: event.timestamp,
        }
    }
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_reason() -> String {
    DEFAULT_LOGOUT_REASON.to_string()
}

fn default_initiator() -> String {
    DEFAULT_INITIATOR.to_string()
}
