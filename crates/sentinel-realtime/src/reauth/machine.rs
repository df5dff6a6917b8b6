//! Per-user reauthentication state machine with timed expiry and grace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_auth::IdentityProvider;
use sentinel_core::config::ReauthConfig;
use sentinel_core::result::AppResult;
use sentinel_core::types::{ChallengeId, ConnectionId, UserId};

use super::state::{
    Challenge, ChallengeSlot, ChallengeView, ExpiredChallenge, IssueOutcome, VerifyOutcome,
};
use crate::executor::KeyedExecutor;

/// Challenge timeout and grace period.
#[derive(Debug, Clone, Copy)]
pub struct ReauthTimings {
    /// How long a challenge stays PENDING.
    pub challenge_timeout: Duration,
    /// How long VERIFIED suppresses new challenges.
    pub grace_period: Duration,
}

impl From<&ReauthConfig> for ReauthTimings {
    fn from(config: &ReauthConfig) -> Self {
        Self {
            challenge_timeout: Duration::from_secs(config.challenge_timeout_seconds),
            grace_period: Duration::from_secs(config.grace_period_seconds),
        }
    }
}

/// Drives every user's challenge slot.
///
/// Slots live in a [`KeyedExecutor`], so transitions for one user never
/// interleave. Expiry and grace timers are tasks holding a child of the
/// machine's shutdown token; replacing or cancelling a slot's timer cancels
/// the task. Expired challenges are reported on the channel returned by
/// [`ReauthStateMachine::new`].
#[derive(Clone)]
pub struct ReauthStateMachine {
    executor: KeyedExecutor<ChallengeSlot>,
    identity: Arc<dyn IdentityProvider>,
    timings: ReauthTimings,
    expirations: mpsc::UnboundedSender<ExpiredChallenge>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ReauthStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthStateMachine")
            .field("timings", &self.timings)
            .finish()
    }
}

impl ReauthStateMachine {
    /// Start the machine. The receiver yields every challenge that expires.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        timings: ReauthTimings,
        shard_count: usize,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ExpiredChallenge>) {
        let (expirations, rx) = mpsc::unbounded_channel();
        let machine = Self {
            executor: KeyedExecutor::spawn("reauth", shard_count, shutdown.clone()),
            identity,
            timings,
            expirations,
            shutdown,
        };
        (machine, rx)
    }

    /// Configured timings.
    pub fn timings(&self) -> ReauthTimings {
        self.timings
    }

    /// Put `user_id` into PENDING and arm the expiry timer.
    ///
    /// No-op while a challenge is pending or a grace period is running; the
    /// outcome says which. `prompted` records the connections the caller is
    /// about to deliver the prompt to.
    pub async fn issue(
        &self,
        user_id: &UserId,
        reason: &str,
        prompted: Vec<ConnectionId>,
    ) -> AppResult<IssueOutcome> {
        let now = Utc::now();
        let challenge = Challenge {
            id: ChallengeId::new(),
            user_id: user_id.clone(),
            reason: reason.to_string(),
            issued_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.timings.challenge_timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
            prompted,
        };
        let expiry = self.shutdown.child_token();
        let timer = expiry.clone();

        let (outcome, _) = self
            .executor
            .run(user_id, move |slot| slot.issue(challenge, timer))
            .await?;

        if let IssueOutcome::Issued(challenge) = &outcome {
            info!(
                user_id = %user_id,
                challenge_id = %challenge.id,
                reason = %reason,
                "Reauthentication challenge issued"
            );
            self.spawn_expiry(user_id.clone(), challenge.id, expiry);
        } else {
            debug!(user_id = %user_id, outcome = ?outcome, "Challenge not issued");
        }
        Ok(outcome)
    }

    /// Check `secret` with the identity provider and apply the result.
    ///
    /// Provider errors leave the slot untouched.
    pub async fn verify(&self, user_id: &UserId, secret: &str) -> AppResult<VerifyOutcome> {
        let accepted = self.identity.verify_secret(user_id, secret).await?;

        if accepted {
            let grace = self.shutdown.child_token();
            let timer = grace.clone();
            let grace_until = Utc::now()
                + chrono::Duration::from_std(self.timings.grace_period)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            let (outcome, epoch) = self
                .executor
                .run(user_id, move |slot| slot.resolve_success(timer, grace_until))
                .await?;
            info!(user_id = %user_id, "Reauthentication verified");
            self.spawn_grace_end(user_id.clone(), epoch, grace);
            Ok(outcome)
        } else {
            let outcome = self
                .executor
                .run(user_id, |slot| slot.resolve_failure())
                .await?;
            warn!(user_id = %user_id, outcome = ?outcome, "Reauthentication failed");
            Ok(outcome)
        }
    }

    /// Expire `challenge_id` if it is still pending. Called by the expiry
    /// timer; a challenge already answered is left alone.
    pub async fn expire(
        &self,
        user_id: &UserId,
        challenge_id: ChallengeId,
    ) -> AppResult<Option<ExpiredChallenge>> {
        let expired = self
            .executor
            .run(user_id, move |slot| slot.expire(challenge_id))
            .await?;
        if let Some(expired) = &expired {
            warn!(
                user_id = %user_id,
                challenge_id = %challenge_id,
                failures = expired.consecutive_failures,
                "Reauthentication challenge expired"
            );
        }
        Ok(expired)
    }

    /// Withdraw `challenge_id` if it is still pending. No failure is counted.
    pub async fn withdraw(&self, user_id: &UserId, challenge_id: ChallengeId) -> AppResult<bool> {
        let withdrawn = self
            .executor
            .run(user_id, move |slot| slot.withdraw(challenge_id))
            .await?;
        if withdrawn {
            debug!(user_id = %user_id, challenge_id = %challenge_id, "Challenge withdrawn");
        }
        Ok(withdrawn)
    }

    /// Uncount the failure recorded when `challenge_id` expired.
    pub async fn forgive_expiry(
        &self,
        user_id: &UserId,
        challenge_id: ChallengeId,
    ) -> AppResult<bool> {
        self.executor
            .run(user_id, move |slot| slot.forgive_expiry(challenge_id))
            .await
    }

    /// Drop the user's slot and cancel its timers.
    pub async fn cancel(&self, user_id: &UserId) -> AppResult<bool> {
        let cancelled = self.executor.run(user_id, |slot| slot.cancel()).await?;
        if cancelled {
            debug!(user_id = %user_id, "Reauthentication state cleared");
        }
        Ok(cancelled)
    }

    /// Current view of a user's slot.
    pub async fn state_of(&self, user_id: &UserId) -> AppResult<ChallengeView> {
        let user = user_id.clone();
        self.executor.run(user_id, move |slot| slot.view(&user)).await
    }

    fn spawn_expiry(&self, user_id: UserId, challenge_id: ChallengeId, token: CancellationToken) {
        let machine = self.clone();
        let timeout = self.timings.challenge_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    match machine.expire(&user_id, challenge_id).await {
                        Ok(Some(expired)) => {
                            // Receiver gone means the hub is shutting down.
                            let _ = machine.expirations.send(expired);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(user_id = %user_id, error = %e, "Challenge expiry failed"),
                    }
                }
            }
        });
    }

    fn spawn_grace_end(&self, user_id: UserId, epoch: u64, token: CancellationToken) {
        let executor = self.executor.clone();
        let grace = self.timings.grace_period;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    match executor.run(&user_id, move |slot| slot.end_grace(epoch)).await {
                        Ok(true) => debug!(user_id = %user_id, "Grace period ended"),
                        Ok(false) => {}
                        Err(e) => warn!(user_id = %user_id, error = %e, "Grace period end failed"),
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reauth::state::{ChallengeOutcome, ChallengeState};
    use async_trait::async_trait;

    struct FixedSecret(&'static str);

    #[async_trait]
    impl IdentityProvider for FixedSecret {
        async fn verify_secret(&self, _user_id: &UserId, secret: &str) -> AppResult<bool> {
            Ok(secret == self.0)
        }
    }

    fn machine() -> (ReauthStateMachine, mpsc::UnboundedReceiver<ExpiredChallenge>) {
        ReauthStateMachine::new(
            Arc::new(FixedSecret("secret")),
            ReauthTimings {
                challenge_timeout: Duration::from_secs(120),
                grace_period: Duration::from_secs(900),
            },
            4,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_two_issues_produce_one_challenge() {
        let (machine, _rx) = machine();
        let u1 = UserId::from("u1");
        let first = machine.issue(&u1, "risk", vec![]).await.expect("issue");
        let second = machine.issue(&u1, "risk", vec![]).await.expect("issue");

        let IssueOutcome::Issued(issued) = first else {
            panic!("first should issue");
        };
        let IssueOutcome::AlreadyPending(pending) = second else {
            panic!("second should be a no-op");
        };
        assert_eq!(issued.id, pending.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_challenge_expires() {
        let (machine, mut rx) = machine();
        let u1 = UserId::from("u1");
        machine.issue(&u1, "risk", vec![]).await.expect("issue");

        tokio::time::sleep(Duration::from_secs(121)).await;
        let expired = rx.recv().await.expect("expired");
        assert_eq!(expired.challenge.user_id, u1);
        assert_eq!(expired.consecutive_failures, 1);

        let view = machine.state_of(&u1).await.expect("state");
        assert_eq!(view.state, ChallengeState::None);
        assert_eq!(view.last_outcome, Some(ChallengeOutcome::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_challenge_never_expires_and_grace_ends() {
        let (machine, mut rx) = machine();
        let u1 = UserId::from("u1");
        machine.issue(&u1, "risk", vec![]).await.expect("issue");
        let outcome = machine.verify(&u1, "secret").await.expect("verify");
        assert!(matches!(outcome, VerifyOutcome::Verified { challenge: Some(_), .. }));

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            machine.issue(&u1, "risk", vec![]).await.expect("issue"),
            IssueOutcome::InGracePeriod { .. }
        ));

        tokio::time::sleep(Duration::from_secs(701)).await;
        assert_eq!(
            machine.state_of(&u1).await.expect("state").state,
            ChallengeState::None
        );
        assert!(matches!(
            machine.issue(&u1, "risk", vec![]).await.expect("issue"),
            IssueOutcome::Issued(_)
        ));
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_and_allows_reissue() {
        let (machine, _rx) = machine();
        let u1 = UserId::from("u1");
        machine.issue(&u1, "risk", vec![]).await.expect("issue");
        let outcome = machine.verify(&u1, "wrong").await.expect("verify");
        assert!(matches!(
            outcome,
            VerifyOutcome::Failed {
                challenge: Some(_),
                consecutive_failures: 1
            }
        ));
        assert!(matches!(
            machine.issue(&u1, "risk", vec![]).await.expect("issue"),
            IssueOutcome::Issued(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawn_challenge_never_expires() {
        let (machine, mut rx) = machine();
        let u1 = UserId::from("u1");
        let IssueOutcome::Issued(issued) = machine.issue(&u1, "risk", vec![]).await.expect("issue")
        else {
            panic!("should issue");
        };
        assert!(machine.withdraw(&u1, issued.id).await.expect("withdraw"));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(rx.try_recv().is_err());
        let view = machine.state_of(&u1).await.expect("state");
        assert_eq!(view.state, ChallengeState::None);
        assert_eq!(view.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_expiry() {
        let (machine, mut rx) = machine();
        let u1 = UserId::from("u1");
        machine.issue(&u1, "risk", vec![]).await.expect("issue");
        assert!(machine.cancel(&u1).await.expect("cancel"));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(rx.try_recv().is_err());
    }
}
