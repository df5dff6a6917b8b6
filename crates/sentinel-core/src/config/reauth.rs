//! Step-up reauthentication configuration.

use serde::{Deserialize, Serialize};

/// Reauthentication challenge timing and escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReauthConfig {
    /// Seconds a PENDING challenge waits before expiring.
    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout_seconds: u64,
    /// Seconds after a successful verification during which no challenge is issued.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// Consecutive failures that force a global logout (0 disables).
    #[serde(default)]
    pub max_failures_before_logout: u32,
}

impl Default for ReauthConfig {
    fn default() -> Self {
        Self {
            challenge_timeout_seconds: default_challenge_timeout(),
            grace_period_seconds: default_grace_period(),
            max_failures_before_logout: 0,
        }
    }
}

fn default_challenge_timeout() -> u64 {
    120
}

fn default_grace_period() -> u64 {
    900
}
