//! Challenge records and the per-user transition rules.
//!
//! ```text
//! NONE ──issue──▶ PENDING ──verify ok──▶ VERIFIED ──grace ends──▶ NONE
//!                    │ ╲
//!                    │  ╲──verify fails──▶ FAILED  ──▶ NONE
//!                    ╰────timeout────────▶ EXPIRED ──▶ NONE
//! ```
//!
//! FAILED and EXPIRED are reported as outcomes but never held: the slot is
//! back at NONE as soon as they happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use sentinel_core::types::{ChallengeId, ConnectionId, UserId};

use crate::executor::KeyedState;

/// Lifecycle state of a user's challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeState {
    /// No challenge outstanding.
    #[default]
    None,
    /// Waiting for the user to answer.
    Pending,
    /// Answered correctly; grace period running.
    Verified,
    /// Answered incorrectly.
    Failed,
    /// Not answered in time.
    Expired,
}

/// Terminal result of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeOutcome {
    /// Secret accepted.
    Verified,
    /// Secret rejected.
    Failed,
    /// Timed out.
    Expired,
}

/// An issued challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge ID.
    pub id: ChallengeId,
    /// Challenged user.
    pub user_id: UserId,
    /// Why it was issued.
    pub reason: String,
    /// When it was issued.
    pub issued_at: DateTime<Utc>,
    /// When it expires.
    pub expires_at: DateTime<Utc>,
    /// Connections that were prompted.
    pub prompted: Vec<ConnectionId>,
}

/// Result of `issue`.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// A new challenge is pending.
    Issued(Challenge),
    /// One was already pending; nothing changed.
    AlreadyPending(Challenge),
    /// The user verified recently; nothing changed.
    InGracePeriod {
        /// When the grace period ends.
        until: DateTime<Utc>,
    },
}

/// Result of `verify`.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Secret accepted; grace period started.
    Verified {
        /// The challenge it answered, if one was pending.
        challenge: Option<Challenge>,
        /// When the grace period ends.
        grace_until: DateTime<Utc>,
    },
    /// Secret rejected.
    Failed {
        /// The challenge that failed, if one was pending.
        challenge: Option<Challenge>,
        /// Failures since the last success.
        consecutive_failures: u32,
    },
}

/// A challenge that timed out.
#[derive(Debug, Clone)]
pub struct ExpiredChallenge {
    /// The challenge.
    pub challenge: Challenge,
    /// Failures since the last success, this expiry included.
    pub consecutive_failures: u32,
}

/// Serializable view of a user's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeView {
    /// User.
    pub user_id: UserId,
    /// Current state.
    pub state: ChallengeState,
    /// The pending challenge, if any.
    pub challenge: Option<Challenge>,
    /// End of the grace period while VERIFIED.
    pub grace_until: Option<DateTime<Utc>>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Most recent terminal outcome.
    pub last_outcome: Option<ChallengeOutcome>,
}

/// Per-user challenge slot, owned by an executor shard.
#[derive(Debug, Default)]
pub struct ChallengeSlot {
    state: ChallengeState,
    current: Option<Challenge>,
    /// Expiry timer while PENDING, grace timer while VERIFIED.
    timer: Option<CancellationToken>,
    /// Bumped whenever `timer` is replaced so stale timers can tell.
    epoch: u64,
    grace_until: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_outcome: Option<ChallengeOutcome>,
    /// Most recent expiry, until it is forgiven or superseded.
    last_expired: Option<ChallengeId>,
}

impl KeyedState for ChallengeSlot {
    fn is_idle(&self) -> bool {
        self.state == ChallengeState::None
            && self.timer.is_none()
            && self.consecutive_failures == 0
    }
}

impl ChallengeSlot {
    /// Current state.
    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Start a challenge unless one is pending or grace is running.
    ///
    /// `expiry` becomes the slot's timer when a challenge is issued.
    pub fn issue(
        &mut self,
        challenge: Challenge,
        expiry: CancellationToken,
    ) -> (IssueOutcome, u64) {
        match self.state {
            ChallengeState::Pending => {
                if let Some(current) = &self.current {
                    return (IssueOutcome::AlreadyPending(current.clone()), self.epoch);
                }
            }
            ChallengeState::Verified => {
                if let Some(until) = self.grace_until {
                    return (IssueOutcome::InGracePeriod { until }, self.epoch);
                }
            }
            _ => {}
        }

        self.replace_timer(Some(expiry));
        self.state = ChallengeState::Pending;
        self.grace_until = None;
        self.current = Some(challenge.clone());
        (IssueOutcome::Issued(challenge), self.epoch)
    }

    /// Record a correct answer and start the grace period.
    pub fn resolve_success(
        &mut self,
        grace: CancellationToken,
        grace_until: DateTime<Utc>,
    ) -> (VerifyOutcome, u64) {
        self.replace_timer(Some(grace));
        let challenge = self.current.take();
        self.state = ChallengeState::Verified;
        self.grace_until = Some(grace_until);
        self.consecutive_failures = 0;
        self.last_outcome = Some(ChallengeOutcome::Verified);
        (
            VerifyOutcome::Verified {
                challenge,
                grace_until,
            },
            self.epoch,
        )
    }

    /// Record a wrong answer. A pending challenge fails and is cleared; an
    /// ongoing grace period is left alone.
    pub fn resolve_failure(&mut self) -> VerifyOutcome {
        let challenge = if self.state == ChallengeState::Pending {
            self.replace_timer(None);
            self.state = ChallengeState::None;
            self.current.take()
        } else {
            None
        };
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_outcome = Some(ChallengeOutcome::Failed);
        VerifyOutcome::Failed {
            challenge,
            consecutive_failures: self.consecutive_failures,
        }
    }

    /// Expire `challenge_id` if it is still the pending challenge.
    pub fn expire(&mut self, challenge_id: ChallengeId) -> Option<ExpiredChallenge> {
        let pending = self.state == ChallengeState::Pending
            && self.current.as_ref().is_some_and(|c| c.id == challenge_id);
        if !pending {
            return None;
        }
        self.replace_timer(None);
        self.state = ChallengeState::None;
        let challenge = self.current.take()?;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_outcome = Some(ChallengeOutcome::Expired);
        self.last_expired = Some(challenge.id);
        Some(ExpiredChallenge {
            challenge,
            consecutive_failures: self.consecutive_failures,
        })
    }

    /// Drop `challenge_id` without counting a failure, if it is still the
    /// pending challenge.
    pub fn withdraw(&mut self, challenge_id: ChallengeId) -> bool {
        let pending = self.state == ChallengeState::Pending
            && self.current.as_ref().is_some_and(|c| c.id == challenge_id);
        if !pending {
            return false;
        }
        self.replace_timer(None);
        self.state = ChallengeState::None;
        self.current = None;
        true
    }

    /// Take back the failure counted when `challenge_id` expired. Used when
    /// none of the prompted sessions were still around to answer it.
    pub fn forgive_expiry(&mut self, challenge_id: ChallengeId) -> bool {
        if self.last_expired != Some(challenge_id) {
            return false;
        }
        self.last_expired = None;
        self.consecutive_failures = self.consecutive_failures.saturating_sub(1);
        if self.last_outcome == Some(ChallengeOutcome::Expired) {
            self.last_outcome = None;
        }
        true
    }

    /// End the grace period armed at `epoch`. Returns whether it did.
    pub fn end_grace(&mut self, epoch: u64) -> bool {
        if self.state != ChallengeState::Verified || self.epoch != epoch {
            return false;
        }
        self.timer = None;
        self.state = ChallengeState::None;
        self.grace_until = None;
        true
    }

    /// Drop everything, cancelling any running timer.
    pub fn cancel(&mut self) -> bool {
        let had_state = self.state != ChallengeState::None || self.consecutive_failures > 0;
        self.replace_timer(None);
        *self = Self {
            epoch: self.epoch,
            ..Self::default()
        };
        had_state
    }

    /// Serializable view.
    pub fn view(&self, user_id: &UserId) -> ChallengeView {
        ChallengeView {
            user_id: user_id.clone(),
            state: self.state,
            challenge: self.current.clone(),
            grace_until: self.grace_until,
            consecutive_failures: self.consecutive_failures,
            last_outcome: self.last_outcome,
        }
    }

    fn replace_timer(&mut self, timer: Option<CancellationToken>) {
        if let Some(old) = self.timer.take() {
            old.cancel();
        }
        self.timer = timer;
        self.epoch = self.epoch.wrapping_add(1);
    }
}
