//! The hub: ties connections, registry, risk and reauthentication together.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_auth::IdentityProvider;
use sentinel_core::config::AppConfig;
use sentinel_core::error::{AppError, ErrorKind};
use sentinel_core::result::AppResult;
use sentinel_core::types::{ConnectionId, UserId};

use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::heartbeat::{EvictionListener, HeartbeatMonitor};
use crate::message::types::{InboundMessage, OutboundMessage};
use crate::message::validator::{parse_inbound, validate_frame};
use crate::metrics::HubMetrics;
use crate::reauth::{
    Challenge, ChallengeOutcome, ChallengeView, ESCALATION_INITIATOR, EscalationAction, EscalationPolicy,
    ExpiredChallenge, IssueOutcome, ReauthStateMachine, ReauthTimings, ThresholdEscalation,
    VerifyOutcome,
};
use crate::registry::{Departure, JoinOutcome, SessionInfo, SessionRegistry};
use crate::risk::{JoinContext, JoinRiskDetector, RiskAggregator, RiskClass, RiskEvent};
use crate::session_control::{BroadcastReport, GlobalLogoutBroadcaster};

/// Point-in-time counts for health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubStats {
    /// Attached transports.
    pub connections: usize,
    /// Registered sessions.
    pub sessions: usize,
    /// Users with at least one session.
    pub users: usize,
}

#[derive(Debug, Clone)]
struct HubSettings {
    send_timeout: Duration,
    max_message_bytes: usize,
    operator_apps: HashSet<String>,
    auto_challenge: bool,
}

/// Real-time session-control and reauthentication hub.
///
/// Constructed once at startup with [`SentinelHub::start`] and torn down
/// with [`SentinelHub::shutdown`]. Background tasks (heartbeat sweeps,
/// challenge expiry handling, operator feeds) stop with it.
pub struct SentinelHub {
    settings: HubSettings,
    /// Attached transports.
    pub connections: Arc<ConnectionPool>,
    /// Session registry.
    pub registry: SessionRegistry,
    /// Global logout fan-out.
    pub broadcaster: GlobalLogoutBroadcaster,
    /// Risk aggregator.
    pub risk: Arc<RiskAggregator>,
    /// Reauthentication state machine.
    pub reauth: ReauthStateMachine,
    /// Counters.
    pub metrics: Arc<HubMetrics>,
    detector: JoinRiskDetector,
    escalation: Arc<dyn EscalationPolicy>,
    operator_feeds: DashMap<ConnectionId, CancellationToken>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SentinelHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelHub")
            .field("connections", &self.connections.connection_count())
            .field("escalation", &self.escalation)
            .finish()
    }
}

impl SentinelHub {
    /// Build the hub and start its background tasks.
    pub fn start(config: &AppConfig, identity: Arc<dyn IdentityProvider>) -> Arc<Self> {
        let escalation = Arc::new(ThresholdEscalation::new(
            config.reauth.max_failures_before_logout,
        ));
        Self::start_with_policy(config, identity, escalation)
    }

    /// Like [`SentinelHub::start`] with a custom escalation policy.
    pub fn start_with_policy(
        config: &AppConfig,
        identity: Arc<dyn IdentityProvider>,
        escalation: Arc<dyn EscalationPolicy>,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let send_timeout = Duration::from_millis(config.hub.send_timeout_ms);

        let connections = Arc::new(ConnectionPool::new(config.hub.channel_buffer_size));
        let registry = SessionRegistry::new(config.hub.shard_count, shutdown.clone());
        let broadcaster =
            GlobalLogoutBroadcaster::new(registry.clone(), Arc::clone(&connections), send_timeout);
        let risk = Arc::new(RiskAggregator::new(
            config.risk.activity_log_capacity,
            config.risk.subscriber_buffer,
        ));
        let (reauth, expirations) = ReauthStateMachine::new(
            identity,
            ReauthTimings::from(&config.reauth),
            config.hub.shard_count,
            shutdown.clone(),
        );

        let hub = Arc::new(Self {
            settings: HubSettings {
                send_timeout,
                max_message_bytes: config.hub.max_message_bytes,
                operator_apps: config.hub.operator_apps.iter().cloned().collect(),
                auto_challenge: config.risk.auto_challenge,
            },
            connections,
            registry: registry.clone(),
            broadcaster,
            risk,
            reauth,
            metrics: Arc::new(HubMetrics::new()),
            detector: JoinRiskDetector::new(config.risk.detector.clone()),
            escalation,
            operator_feeds: DashMap::new(),
            shutdown: shutdown.clone(),
        });

        // ── Heartbeat sweeps ──
        let monitor = HeartbeatMonitor::new(registry, &config.heartbeat);
        let listener: Arc<dyn EvictionListener> = hub.clone();
        tokio::spawn(monitor.run(listener, shutdown.clone()));

        // ── Challenge expiry ──
        tokio::spawn(Arc::clone(&hub).run_expirations(expirations));

        info!(
            shards = config.hub.shard_count,
            operator_apps = ?config.hub.operator_apps,
            auto_challenge = config.risk.auto_challenge,
            "Sentinel hub started"
        );
        hub
    }

    /// Attach a new transport.
    pub fn attach(
        &self,
        remote: Option<String>,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (handle, rx) = self.connections.register(remote);
        HubMetrics::inc(&self.metrics.connections_total);
        debug!(conn_id = %handle.id, remote = ?handle.remote, "Connection attached");
        (handle, rx)
    }

    /// Handle one raw text frame. Malformed frames are dropped and logged.
    pub async fn handle_frame(&self, conn_id: ConnectionId, raw: &str) {
        let parsed = validate_frame(raw, self.settings.max_message_bytes)
            .and_then(|()| parse_inbound(raw));
        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                HubMetrics::inc(&self.metrics.protocol_errors);
                warn!(conn_id = %conn_id, error = %e, "Dropping inbound frame");
                return;
            }
        };

        if let Err(e) = self.handle_message(conn_id, message).await {
            warn!(conn_id = %conn_id, error = %e, "Inbound message failed");
        }
    }

    /// Handle one parsed message from `conn_id`.
    pub async fn handle_message(
        &self,
        conn_id: ConnectionId,
        message: InboundMessage,
    ) -> AppResult<()> {
        debug!(conn_id = %conn_id, event = message.event_name(), user_id = %message.user_id(), "Inbound");

        match message {
            InboundMessage::Join { user_id, app_name } => {
                self.on_join(conn_id, user_id, app_name).await
            }
            InboundMessage::Heartbeat { user_id } => self.on_heartbeat(conn_id, user_id).await,
            InboundMessage::ForceGlobalLogout {
                user_id,
                reason,
                initiator,
            } => {
                if self.authorize(conn_id, &user_id, "force_global_logout") {
                    self.force_logout(&user_id, &initiator, &reason).await?;
                }
                Ok(())
            }
            InboundMessage::VerifyPassword { user_id, password } => {
                if self.authorize(conn_id, &user_id, "verify_password") {
                    self.verify(conn_id, &user_id, &password).await?;
                }
                Ok(())
            }
            InboundMessage::Leave { user_id } => {
                if self.authorize(conn_id, &user_id, "leave") {
                    self.end_session(conn_id).await?;
                }
                Ok(())
            }
        }
    }

    /// The transport for `conn_id` went away.
    pub async fn on_disconnect(&self, conn_id: ConnectionId) {
        if let Err(e) = self.end_session(conn_id).await {
            warn!(conn_id = %conn_id, error = %e, "Failed to end session on disconnect");
        }
        self.connections.remove(&conn_id);
        debug!(conn_id = %conn_id, "Connection detached");
    }

    /// Terminate every session of `user_id` and clear its challenge state.
    pub async fn force_logout(
        &self,
        user_id: &UserId,
        initiator: &str,
        reason: &str,
    ) -> AppResult<BroadcastReport> {
        let report = self.broadcaster.trigger(user_id, initiator, reason).await?;

        HubMetrics::inc(&self.metrics.logouts_broadcast);
        HubMetrics::add(&self.metrics.logout_deliveries, report.delivered as u64);
        HubMetrics::add(&self.metrics.logout_delivery_failures, report.failed as u64);
        for conn_id in report.connections() {
            self.stop_operator_feed(conn_id);
        }

        self.reauth.cancel(user_id).await?;
        Ok(report)
    }

    /// Record a risk event and, if configured, challenge the user.
    pub async fn ingest_risk(&self, event: RiskEvent) -> AppResult<RiskClass> {
        let user_id = event.user_id.clone();
        let score = event.score;
        let reason = if event.reasons.is_empty() {
            format!("Elevated risk score {score}")
        } else {
            format!("Elevated risk score {score}: {}", event.reasons.join(", "))
        };

        let class = self.risk.ingest(event)?;
        HubMetrics::inc(&self.metrics.risk_events);

        if class == RiskClass::KillEligible {
            warn!(
                user_id = %user_id,
                score,
                "Risk score warrants a global logout; awaiting operator action"
            );
        }

        if self.settings.auto_challenge && class >= RiskClass::Warn {
            match self.issue_challenge(&user_id, &reason).await {
                Ok(_) => {}
                Err(e) if e.kind == ErrorKind::NotFound => {
                    debug!(user_id = %user_id, "No open sessions to challenge");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(class)
    }

    /// Issue a reauthentication challenge to every session of `user_id`.
    pub async fn issue_challenge(&self, user_id: &UserId, reason: &str) -> AppResult<IssueOutcome> {
        let sessions = self.registry.sessions_of(user_id).await?;
        if sessions.is_empty() {
            return Err(AppError::not_found(format!(
                "User {user_id} has no open sessions"
            )));
        }

        let prompted: Vec<ConnectionId> = sessions.iter().map(|s| s.connection_id).collect();
        let mut outcome = self.reauth.issue(user_id, reason, prompted.clone()).await?;

        // A pending challenge whose sessions are all gone can never be answered.
        let stale = match &outcome {
            IssueOutcome::AlreadyPending(pending) if !self.reaches_user(pending) => Some(pending.id),
            _ => None,
        };
        if let Some(stale) = stale {
            if self.reauth.withdraw(user_id, stale).await? {
                outcome = self.reauth.issue(user_id, reason, prompted.clone()).await?;
            }
        }

        if let IssueOutcome::Issued(challenge) = &outcome {
            // The registry and the challenge slots are serialized separately,
            // so the last session may have left while this was issued.
            if !self.reaches_user(challenge) {
                self.reauth.withdraw(user_id, challenge.id).await?;
                return Err(AppError::not_found(format!(
                    "User {user_id} has no open sessions"
                )));
            }
            HubMetrics::inc(&self.metrics.challenges_issued);
            let prompt = OutboundMessage::RequireReauth {
                user_id: user_id.clone(),
                challenge_id: challenge.id,
                reason: reason.to_string(),
                expires_in_seconds: self.reauth.timings().challenge_timeout.as_secs(),
            };
            self.send_many(&prompted, prompt).await;
        }
        Ok(outcome)
    }

    /// Sessions of a user.
    pub async fn sessions_of(&self, user_id: &UserId) -> AppResult<Vec<SessionInfo>> {
        self.registry.sessions_of(user_id).await
    }

    /// Challenge state of a user.
    pub async fn challenge_state(&self, user_id: &UserId) -> AppResult<ChallengeView> {
        self.reauth.state_of(user_id).await
    }

    /// Live risk updates.
    pub fn subscribe_risk(&self) -> broadcast::Receiver<RiskEvent> {
        self.risk.subscribe()
    }

    /// Counts for health checks.
    pub async fn stats(&self) -> AppResult<HubStats> {
        Ok(HubStats {
            connections: self.connections.connection_count(),
            sessions: self.registry.session_count(),
            users: self.registry.user_count().await?,
        })
    }

    /// Stop background tasks and hang up every connection.
    pub fn shutdown(&self) {
        info!("Shutting down sentinel hub");
        self.shutdown.cancel();
        let closed = self.connections.close_all();
        info!(closed, "Sentinel hub shut down");
    }

    /// Whether [`SentinelHub::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn on_join(
        &self,
        conn_id: ConnectionId,
        user_id: UserId,
        app_name: String,
    ) -> AppResult<()> {
        let outcome = self.registry.join(&user_id, &app_name, conn_id).await?;

        let (session_count, fresh_join) = match outcome {
            JoinOutcome::Conflict { owner } => {
                HubMetrics::inc(&self.metrics.protocol_errors);
                warn!(
                    conn_id = %conn_id,
                    user_id = %user_id,
                    owner = %owner,
                    "Connection already joined as another user"
                );
                self.send_to(
                    &conn_id,
                    OutboundMessage::error(
                        ErrorKind::Conflict.to_string(),
                        "Connection is already joined as another user",
                    ),
                )
                .await;
                return Ok(());
            }
            JoinOutcome::AlreadyJoined { session_count } => (session_count, None),
            JoinOutcome::Joined {
                session_count,
                since_previous_join,
            } => {
                HubMetrics::inc(&self.metrics.joins);
                info!(
                    conn_id = %conn_id,
                    user_id = %user_id,
                    app = %app_name,
                    sessions = session_count,
                    "Session joined"
                );
                (session_count, Some(since_previous_join))
            }
        };

        self.send_to(
            &conn_id,
            OutboundMessage::Joined {
                user_id: user_id.clone(),
                app_name: app_name.clone(),
                session_count,
            },
        )
        .await;

        // Repeated joins on the same connection are acknowledged only.
        let Some(since_previous_join) = fresh_join else {
            return Ok(());
        };

        if self.settings.operator_apps.contains(&app_name) {
            self.start_operator_feed(conn_id);
        }

        let context = JoinContext {
            session_count,
            since_previous_join,
            local_hour: chrono::Local::now().hour(),
        };
        if let Some(event) = self.detector.assess(&user_id, &app_name, &context) {
            self.ingest_risk(event).await?;
        }
        Ok(())
    }

    async fn on_heartbeat(&self, conn_id: ConnectionId, user_id: UserId) -> AppResult<()> {
        let alive = match self.registry.owner_of(&conn_id) {
            Some(owner) if owner == user_id => self.registry.heartbeat(&user_id, &conn_id).await?,
            Some(_) => {
                self.authorize(conn_id, &user_id, "heartbeat");
                return Ok(());
            }
            None => false,
        };

        if !alive {
            debug!(conn_id = %conn_id, user_id = %user_id, "Heartbeat for unknown session");
            self.send_to(
                &conn_id,
                OutboundMessage::error("NOT_JOINED", "No session is registered for this connection"),
            )
            .await;
        }
        Ok(())
    }

    async fn verify(&self, conn_id: ConnectionId, user_id: &UserId, password: &str) -> AppResult<()> {
        let outcome = match self.reauth.verify(user_id, password).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Identity provider unavailable");
                self.send_to(&conn_id, OutboundMessage::error(e.code(), e.message.clone()))
                    .await;
                return Ok(());
            }
        };

        match outcome {
            VerifyOutcome::Verified { .. } => {
                HubMetrics::inc(&self.metrics.challenges_verified);
                let targets: Vec<ConnectionId> = self
                    .registry
                    .sessions_of(user_id)
                    .await?
                    .into_iter()
                    .map(|s| s.connection_id)
                    .collect();
                self.send_many(
                    &targets,
                    OutboundMessage::ReauthSuccess {
                        user_id: user_id.clone(),
                        message: "Verified".to_string(),
                    },
                )
                .await;
            }
            VerifyOutcome::Failed {
                consecutive_failures,
                ..
            } => {
                HubMetrics::inc(&self.metrics.challenges_failed);
                self.send_to(
                    &conn_id,
                    OutboundMessage::ReauthFailed {
                        user_id: user_id.clone(),
                        outcome: ChallengeOutcome::Failed,
                        message: "Invalid Password".to_string(),
                    },
                )
                .await;
                self.escalate(user_id, ChallengeOutcome::Failed, consecutive_failures)
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_expired(&self, expired: ExpiredChallenge) -> AppResult<()> {
        let user_id = expired.challenge.user_id.clone();

        let targets: Vec<ConnectionId> = expired
            .challenge
            .prompted
            .iter()
            .filter(|conn_id| self.registry.owner_of(conn_id).as_ref() == Some(&user_id))
            .copied()
            .collect();
        if targets.is_empty() {
            debug!(
                user_id = %user_id,
                challenge_id = %expired.challenge.id,
                "Expired challenge outlived its sessions; not counted"
            );
            self.reauth
                .forgive_expiry(&user_id, expired.challenge.id)
                .await?;
            return Ok(());
        }

        HubMetrics::inc(&self.metrics.challenges_expired);
        self.send_many(
            &targets,
            OutboundMessage::ReauthFailed {
                user_id: user_id.clone(),
                outcome: ChallengeOutcome::Expired,
                message: "Reauthentication timed out".to_string(),
            },
        )
        .await;

        self.escalate(&user_id, ChallengeOutcome::Expired, expired.consecutive_failures)
            .await
    }

    async fn escalate(
        &self,
        user_id: &UserId,
        outcome: ChallengeOutcome,
        consecutive_failures: u32,
    ) -> AppResult<()> {
        match self
            .escalation
            .on_failure(user_id, outcome, consecutive_failures)
        {
            EscalationAction::None => Ok(()),
            EscalationAction::ForceLogout { reason } => {
                warn!(user_id = %user_id, reason = %reason, "Escalating to global logout");
                self.force_logout(user_id, ESCALATION_INITIATOR, &reason)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn end_session(&self, conn_id: ConnectionId) -> AppResult<()> {
        self.stop_operator_feed(&conn_id);
        let Some(Departure { session, remaining }) = self.registry.leave(&conn_id).await? else {
            return Ok(());
        };

        HubMetrics::inc(&self.metrics.leaves);
        info!(
            conn_id = %conn_id,
            user_id = %session.user_id,
            app = %session.app_name,
            remaining,
            "Session left"
        );
        if remaining == 0 {
            self.reauth.cancel(&session.user_id).await?;
        }
        Ok(())
    }

    /// Whether any connection prompted by `challenge` still belongs to its user.
    fn reaches_user(&self, challenge: &Challenge) -> bool {
        challenge
            .prompted
            .iter()
            .any(|conn_id| self.registry.owner_of(conn_id).as_ref() == Some(&challenge.user_id))
    }

    fn authorize(&self, conn_id: ConnectionId, claimed: &UserId, event: &str) -> bool {
        match self.registry.owner_of(&conn_id) {
            Some(owner) if &owner == claimed => true,
            owner => {
                HubMetrics::inc(&self.metrics.protocol_errors);
                warn!(
                    conn_id = %conn_id,
                    claimed = %claimed,
                    joined_as = ?owner.as_ref().map(UserId::as_str),
                    event,
                    "Ignoring event for a user this connection has not joined as"
                );
                false
            }
        }
    }

    async fn send_to(&self, conn_id: &ConnectionId, message: OutboundMessage) {
        let Some(handle) = self.connections.get(conn_id) else {
            debug!(conn_id = %conn_id, event = message.event_name(), "Connection gone");
            return;
        };
        let event = message.event_name();
        if let Err(e) = handle.send(message, self.settings.send_timeout).await {
            warn!(conn_id = %conn_id, event, error = %e, "Send failed");
        }
    }

    async fn send_many(&self, conn_ids: &[ConnectionId], message: OutboundMessage) {
        join_all(
            conn_ids
                .iter()
                .map(|conn_id| self.send_to(conn_id, message.clone())),
        )
        .await;
    }

    fn start_operator_feed(&self, conn_id: ConnectionId) {
        let Some(handle) = self.connections.get(&conn_id) else {
            return;
        };
        let token = handle.closed_token().child_token();
        if let Some(previous) = self.operator_feeds.insert(conn_id, token.clone()) {
            previous.cancel();
        }

        let mut updates = self.risk.subscribe();
        let send_timeout = self.settings.send_timeout;
        debug!(conn_id = %conn_id, "Operator feed started");

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    update = updates.recv() => match update {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(conn_id = %conn_id, skipped, "Operator feed lagging");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if let Err(e) = handle.send(OutboundMessage::from(&event), send_timeout).await {
                    if e.kind == ErrorKind::Transport {
                        break;
                    }
                    warn!(conn_id = %conn_id, error = %e, "RISK_UPDATE dropped");
                }
            }
            debug!(conn_id = %conn_id, "Operator feed stopped");
        });
    }

    fn stop_operator_feed(&self, conn_id: &ConnectionId) {
        if let Some((_, token)) = self.operator_feeds.remove(conn_id) {
            token.cancel();
        }
    }

    async fn run_expirations(self: Arc<Self>, mut expirations: mpsc::UnboundedReceiver<ExpiredChallenge>) {
        loop {
            let expired = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                expired = expirations.recv() => match expired {
                    Some(expired) => expired,
                    None => break,
                },
            };
            if let Err(e) = self.on_expired(expired).await {
                warn!(error = %e, "Handling expired challenge failed");
            }
        }
        debug!("Expiry handler stopped");
    }
}

#[async_trait]
impl EvictionListener for SentinelHub {
    async fn on_evicted(&self, departure: Departure) {
        HubMetrics::inc(&self.metrics.evictions);
        self.stop_operator_feed(&departure.session.connection_id);
        info!(
            conn_id = %departure.session.connection_id,
            user_id = %departure.session.user_id,
            remaining = departure.remaining,
            "Stale session evicted"
        );
        if departure.remaining == 0 {
            if let Err(e) = self.reauth.cancel(&departure.session.user_id).await {
                warn!(error = %e, "Failed to clear challenge state after eviction");
            }
        }
    }
}
