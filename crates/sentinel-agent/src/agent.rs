//! The client session agent.
//!
//! One agent runs per open application channel. It owns the connection
//! lifecycle (`DISCONNECTED → CONNECTING → CONNECTED → JOINED`), heartbeats
//! while joined, and turns hub control events into [`AgentEvent`]s for the
//! embedding application.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_core::types::{ChallengeId, UserId};
use sentinel_realtime::message::{InboundMessage, OutboundMessage};
use sentinel_realtime::reauth::ChallengeOutcome;
use sentinel_realtime::risk::RiskStatus;

use crate::backoff::Backoff;
use crate::state::{AgentStatus, ConnectionState, ExitReason, PendingChallenge};
use crate::transport::{Duplex, Transport};

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// User the channel belongs to.
    pub user_id: UserId,
    /// Branded application name sent on join.
    pub app_name: String,
    /// Heartbeat period while joined.
    pub heartbeat_interval: Duration,
    /// Reconnect policy.
    pub backoff: Backoff,
    /// Tear down on a wrong-password failure, not only on expiry.
    pub terminate_on_reauth_failure: bool,
}

impl AgentConfig {
    /// Defaults: 120s heartbeats, five reconnect attempts.
    pub fn new(user_id: impl Into<UserId>, app_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            app_name: app_name.into(),
            heartbeat_interval: Duration::from_secs(120),
            backoff: Backoff::default(),
            terminate_on_reauth_failure: false,
        }
    }
}

/// Requests from the embedding application.
#[derive(Debug, Clone)]
pub enum AgentCommand {
    /// Ask the hub to end every session of this user.
    ForceGlobalLogout {
        /// Why.
        reason: String,
        /// Who.
        initiator: String,
    },
    /// Answer a reauthentication challenge.
    Verify {
        /// The user's password.
        password: String,
    },
}

/// What the agent observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// The transport could not be established.
    ConnectError {
        /// Transport error text.
        message: String,
    },
    /// The hub acknowledged the join.
    Joined {
        /// Sessions the user has open.
        session_count: usize,
    },
    /// Risk telemetry (operator channels only).
    RiskUpdate {
        /// Subject user.
        user_id: UserId,
        /// Application.
        app_name: String,
        /// Score.
        score: f64,
        /// Status.
        status: RiskStatus,
        /// Reasons.
        reasons: Vec<String>,
    },
    /// The user must re-enter their password.
    ReauthRequired {
        /// Challenge ID.
        challenge_id: ChallengeId,
        /// Why.
        reason: String,
        /// Seconds to answer.
        expires_in_seconds: u64,
    },
    /// The password was accepted.
    ReauthSucceeded,
    /// The challenge failed or expired.
    ReauthFailed {
        /// Which.
        outcome: ChallengeOutcome,
        /// Hub message.
        message: String,
    },
    /// The hub refused a request.
    HubError {
        /// Error code.
        code: String,
        /// Description.
        message: String,
    },
    /// The agent stopped; the local session must be torn down.
    Terminated(ExitReason),
}

/// Control surface for a running agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    status: watch::Receiver<AgentStatus>,
    cancel: CancellationToken,
    torn_down: Arc<AtomicBool>,
}

impl AgentHandle {
    /// Ask the hub to log this user out everywhere.
    pub async fn force_global_logout(
        &self,
        reason: impl Into<String>,
        initiator: impl Into<String>,
    ) -> AppResult<()> {
        self.send(AgentCommand::ForceGlobalLogout {
            reason: reason.into(),
            initiator: initiator.into(),
        })
        .await
    }

    /// Answer the pending challenge.
    pub async fn verify(&self, password: impl Into<String>) -> AppResult<()> {
        self.send(AgentCommand::Verify {
            password: password.into(),
        })
        .await
    }

    /// Local logout: stop reconnecting and tear down.
    ///
    /// Returns `false` if the agent had already torn down, e.g. because a
    /// `LOGOUT_ALL` arrived first.
    pub fn logout(&self) -> bool {
        let first = !self.torn_down.load(Ordering::SeqCst);
        self.cancel.cancel();
        first
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.status.clone()
    }

    async fn send(&self, command: AgentCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::service_unavailable("Agent has stopped"))
    }
}

enum LinkEnd {
    Exit(ExitReason),
    Dropped(String),
}

/// Runs the agent loop over a [`Transport`].
pub struct SessionAgent {
    config: AgentConfig,
    transport: Arc<dyn Transport>,
    commands: mpsc::Receiver<AgentCommand>,
    events: mpsc::UnboundedSender<AgentEvent>,
    status: watch::Sender<AgentStatus>,
    cancel: CancellationToken,
    torn_down: Arc<AtomicBool>,
}

impl SessionAgent {
    /// Start an agent. Returns its handle, its event stream and the task
    /// that resolves with the exit reason.
    pub fn spawn(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
    ) -> (
        AgentHandle,
        mpsc::UnboundedReceiver<AgentEvent>,
        JoinHandle<ExitReason>,
    ) {
        let (commands_tx, commands) = mpsc::channel(16);
        let (events, events_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(AgentStatus::default());
        let cancel = CancellationToken::new();
        let torn_down = Arc::new(AtomicBool::new(false));

        let agent = Self {
            config,
            transport,
            commands,
            events,
            status,
            cancel: cancel.clone(),
            torn_down: Arc::clone(&torn_down),
        };
        let task = tokio::spawn(agent.run());

        let handle = AgentHandle {
            commands: commands_tx,
            status: status_rx,
            cancel,
            torn_down,
        };
        (handle, events_rx, task)
    }

    async fn run(mut self) -> ExitReason {
        let mut failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return self.teardown(ExitReason::LocalLogout);
            }

            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return self.teardown(ExitReason::LocalLogout),
                result = self.transport.connect() => result,
            };

            let error = match connected {
                Ok(link) => {
                    failures = 0;
                    self.status.send_modify(|s| {
                        s.reconnect_attempts = 0;
                        s.last_error = None;
                    });
                    self.set_state(ConnectionState::Connected);
                    match self.drive(link).await {
                        LinkEnd::Exit(reason) => return self.teardown(reason),
                        LinkEnd::Dropped(error) => error,
                    }
                }
                Err(e) => {
                    self.emit(AgentEvent::ConnectError {
                        message: e.message.clone(),
                    });
                    e.to_string()
                }
            };

            self.set_state(ConnectionState::Disconnected);
            failures += 1;
            self.status.send_modify(|s| {
                s.reconnect_attempts = failures;
                s.last_error = Some(error.clone());
            });

            let Some(delay) = self.config.backoff.delay(failures) else {
                warn!(
                    user_id = %self.config.user_id,
                    attempts = failures - 1,
                    error = %error,
                    "Giving up reconnecting"
                );
                self.status.send_modify(|s| s.gave_up = true);
                return self.teardown(ExitReason::GaveUp {
                    attempts: failures - 1,
                });
            };

            debug!(
                user_id = %self.config.user_id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return self.teardown(ExitReason::LocalLogout),
                _ = time::sleep(delay) => {}
            }
        }
    }

    async fn drive(&mut self, link: Duplex) -> LinkEnd {
        let Duplex {
            outgoing,
            mut incoming,
        } = link;

        if let Err(e) = self.send_join(&outgoing).await {
            return LinkEnd::Dropped(e.to_string());
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return LinkEnd::Exit(ExitReason::LocalLogout),

                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if let Err(e) = self.forward(command, &outgoing).await {
                            return LinkEnd::Dropped(e.to_string());
                        }
                    }
                    None => commands_open = false,
                },

                _ = heartbeat.tick(), if self.state() == ConnectionState::Joined => {
                    let beat = InboundMessage::Heartbeat {
                        user_id: self.config.user_id.clone(),
                    };
                    if outgoing.send(beat).await.is_err() {
                        return LinkEnd::Dropped("link closed while sending heartbeat".into());
                    }
                }

                message = incoming.recv() => match message {
                    Some(message) => {
                        if let Some(end) = self.on_message(message, &outgoing).await {
                            return end;
                        }
                    }
                    None => return LinkEnd::Dropped("link closed by hub".into()),
                },
            }
        }
    }

    async fn on_message(
        &mut self,
        message: OutboundMessage,
        outgoing: &mpsc::Sender<InboundMessage>,
    ) -> Option<LinkEnd> {
        if let Some(target) = message.target_user() {
            if target != &self.config.user_id {
                debug!(
                    user_id = %self.config.user_id,
                    target = %target,
                    event = message.event_name(),
                    "Discarding message for another user"
                );
                return None;
            }
        }

        match message {
            OutboundMessage::Joined { session_count, .. } => {
                self.set_state(ConnectionState::Joined);
                self.emit(AgentEvent::Joined { session_count });
            }
            OutboundMessage::LogoutAll {
                initiator, reason, ..
            } => {
                info!(
                    user_id = %self.config.user_id,
                    initiator = %initiator,
                    reason = %reason,
                    "Global logout received"
                );
                return Some(LinkEnd::Exit(ExitReason::GlobalLogout { initiator, reason }));
            }
            OutboundMessage::RiskUpdate {
                user_id,
                app_name,
                score,
                status,
                reasons,
                ..
            } => self.emit(AgentEvent::RiskUpdate {
                user_id,
                app_name,
                score,
                status,
                reasons,
            }),
            OutboundMessage::RequireReauth {
                challenge_id,
                reason,
                expires_in_seconds,
                ..
            } => {
                let pending = PendingChallenge {
                    challenge_id,
                    reason: reason.clone(),
                    expires_in_seconds,
                };
                self.status
                    .send_modify(|s| s.pending_challenge = Some(pending));
                self.emit(AgentEvent::ReauthRequired {
                    challenge_id,
                    reason,
                    expires_in_seconds,
                });
            }
            OutboundMessage::ReauthSuccess { .. } => {
                self.status.send_modify(|s| s.pending_challenge = None);
                self.emit(AgentEvent::ReauthSucceeded);
            }
            OutboundMessage::ReauthFailed {
                outcome, message, ..
            } => {
                self.status.send_modify(|s| s.pending_challenge = None);
                self.emit(AgentEvent::ReauthFailed {
                    outcome,
                    message,
                });
                let terminal = outcome == ChallengeOutcome::Expired
                    || self.config.terminate_on_reauth_failure;
                if terminal {
                    return Some(LinkEnd::Exit(ExitReason::ReauthFailed { outcome }));
                }
            }
            OutboundMessage::Error { code, message } => {
                if code == "NOT_JOINED" {
                    debug!(user_id = %self.config.user_id, "Hub lost our session; rejoining");
                    if let Err(e) = self.send_join(outgoing).await {
                        return Some(LinkEnd::Dropped(e.to_string()));
                    }
                } else {
                    warn!(user_id = %self.config.user_id, code = %code, message = %message, "Hub error");
                    self.emit(AgentEvent::HubError { code, message });
                }
            }
        }
        None
    }

    async fn send_join(&self, outgoing: &mpsc::Sender<InboundMessage>) -> AppResult<()> {
        self.set_state(ConnectionState::Connected);
        outgoing
            .send(InboundMessage::Join {
                user_id: self.config.user_id.clone(),
                app_name: self.config.app_name.clone(),
            })
            .await
            .map_err(|_| AppError::transport("link closed while joining"))
    }

    async fn forward(
        &self,
        command: AgentCommand,
        outgoing: &mpsc::Sender<InboundMessage>,
    ) -> AppResult<()> {
        let user_id = self.config.user_id.clone();
        let message = match command {
            AgentCommand::ForceGlobalLogout { reason, initiator } => {
                InboundMessage::ForceGlobalLogout {
                    user_id,
                    reason,
                    initiator,
                }
            }
            AgentCommand::Verify { password } => InboundMessage::VerifyPassword { user_id, password },
        };
        outgoing
            .send(message)
            .await
            .map_err(|_| AppError::transport("link closed while sending command"))
    }

    fn teardown(&self, reason: ExitReason) -> ExitReason {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return reason;
        }
        info!(user_id = %self.config.user_id, app = %self.config.app_name, reason = ?reason, "Agent stopped");
        self.status.send_modify(|s| {
            s.state = ConnectionState::Disconnected;
            s.pending_challenge = None;
            s.exit = Some(reason.clone());
        });
        self.emit(AgentEvent::StateChanged(ConnectionState::Disconnected));
        self.emit(AgentEvent::Terminated(reason.clone()));
        reason
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            s.state = state;
            true
        });
        if changed {
            self.emit(AgentEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: AgentEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_auth::StaticIdentityProvider;
    use sentinel_core::config::{AppConfig, AuthConfig};
    use sentinel_realtime::SentinelHub;

    use crate::transport::HubTransport;

    /// Far end of a scripted link, held by the test.
    struct FarEnd {
        from_agent: mpsc::Receiver<InboundMessage>,
        to_agent: mpsc::Sender<OutboundMessage>,
    }

    /// Hands every link's far end to the test; fails when `down` is set.
    struct ScriptedTransport {
        links: mpsc::UnboundedSender<FarEnd>,
        down: bool,
    }

    impl ScriptedTransport {
        fn new(down: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<FarEnd>) {
            let (links, rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                links,
                down,
            });
            (transport, rx)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&self) -> AppResult<Duplex> {
            if self.down {
                return Err(AppError::transport("connect_error: refused"));
            }
            let (outgoing, from_agent) = mpsc::channel(16);
            let (to_agent, incoming) = mpsc::channel(16);
            let _ = self.links.send(FarEnd {
                from_agent,
                to_agent,
            });
            Ok(Duplex { outgoing, incoming })
        }
    }

    async fn next_event(
        events: &mut mpsc::UnboundedReceiver<AgentEvent>,
        want: impl Fn(&AgentEvent) -> bool,
    ) -> AgentEvent {
        loop {
            let event = time::timeout(Duration::from_secs(600), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed");
            if want(&event) {
                return event;
            }
        }
    }

    fn joined(user: &str) -> OutboundMessage {
        OutboundMessage::Joined {
            user_id: UserId::from(user),
            app_name: "HR Portal".into(),
            session_count: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_joins_then_heartbeats_on_interval() {
        let (transport, mut links) = ScriptedTransport::new(false);
        let (handle, mut events, _task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);

        let mut far = links.recv().await.expect("link");
        let join = far.from_agent.recv().await.expect("join frame");
        assert!(matches!(join, InboundMessage::Join { ref user_id, ref app_name }
            if user_id.as_str() == "u1" && app_name == "HR Portal"));
        assert_eq!(handle.status().state, ConnectionState::Connected);

        far.to_agent.send(joined("u1")).await.expect("send");
        next_event(&mut events, |e| matches!(e, AgentEvent::Joined { .. })).await;
        assert_eq!(handle.status().state, ConnectionState::Joined);

        let beat = far.from_agent.recv().await.expect("heartbeat");
        assert!(matches!(beat, InboundMessage::Heartbeat { .. }));
        handle.logout();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (transport, _links) = ScriptedTransport::new(true);
        let (handle, _events, task) =
            SessionAgent::spawn(AgentConfig::new("u1", "CRM System"), transport);

        let exit = task.await.expect("agent task");
        assert_eq!(exit, ExitReason::GaveUp { attempts: 5 });

        let status = handle.status();
        assert!(status.gave_up);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_and_rejoins_after_drop() {
        let (transport, mut links) = ScriptedTransport::new(false);
        let (handle, _events, _task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);

        let first = links.recv().await.expect("first link");
        drop(first);

        let mut second = links.recv().await.expect("second link");
        let join = second.from_agent.recv().await.expect("rejoin");
        assert!(matches!(join, InboundMessage::Join { .. }));
        assert_eq!(handle.status().reconnect_attempts, 0);
        handle.logout();
    }

    #[tokio::test]
    async fn test_discards_messages_for_other_users() {
        let (transport, mut links) = ScriptedTransport::new(false);
        let (_handle, mut events, task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);

        let far = links.recv().await.expect("link");
        far.to_agent
            .send(OutboundMessage::LogoutAll {
                user_id: UserId::from("u2"),
                initiator: "Admin".into(),
                reason: "Manual Global Logout".into(),
                timestamp: chrono::Utc::now(),
            })
            .await
            .expect("send");
        far.to_agent.send(joined("u1")).await.expect("send");

        next_event(&mut events, |e| matches!(e, AgentEvent::Joined { .. })).await;
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_rejoins_when_hub_reports_not_joined() {
        let (transport, mut links) = ScriptedTransport::new(false);
        let (handle, _events, _task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);

        let mut far = links.recv().await.expect("link");
        far.from_agent.recv().await.expect("join");
        far.to_agent
            .send(OutboundMessage::error("NOT_JOINED", "Connection has no session"))
            .await
            .expect("send");

        let again = far.from_agent.recv().await.expect("second join");
        assert!(matches!(again, InboundMessage::Join { .. }));
        handle.logout();
    }

    #[tokio::test]
    async fn test_expired_challenge_tears_down() {
        let (transport, mut links) = ScriptedTransport::new(false);
        let (handle, mut events, task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);

        let far = links.recv().await.expect("link");
        let challenge_id = ChallengeId::new();
        far.to_agent
            .send(OutboundMessage::RequireReauth {
                user_id: UserId::from("u1"),
                challenge_id,
                reason: "Elevated risk".into(),
                expires_in_seconds: 120,
            })
            .await
            .expect("send");
        next_event(&mut events, |e| matches!(e, AgentEvent::ReauthRequired { .. })).await;
        assert_eq!(
            handle.status().pending_challenge.map(|c| c.challenge_id),
            Some(challenge_id)
        );

        far.to_agent
            .send(OutboundMessage::ReauthFailed {
                user_id: UserId::from("u1"),
                outcome: ChallengeOutcome::Expired,
                message: "Reauthentication timed out".into(),
            })
            .await
            .expect("send");

        let exit = task.await.expect("agent task");
        assert_eq!(
            exit,
            ExitReason::ReauthFailed {
                outcome: ChallengeOutcome::Expired
            }
        );
        assert!(handle.status().pending_challenge.is_none());
    }

    #[tokio::test]
    async fn test_global_logout_over_hub_and_idempotent_local_logout() {
        let identity = StaticIdentityProvider::from_config(&AuthConfig::default())
            .expect("identity provider");
        let hub = SentinelHub::start(&AppConfig::default(), Arc::new(identity));
        let transport = Arc::new(HubTransport::new(Arc::clone(&hub)));

        let (hr, mut hr_events, hr_task) =
            SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport.clone());
        let (_crm, mut crm_events, crm_task) =
            SessionAgent::spawn(AgentConfig::new("u1", "CRM System"), transport);

        next_event(&mut hr_events, |e| matches!(e, AgentEvent::Joined { .. })).await;
        next_event(&mut crm_events, |e| matches!(e, AgentEvent::Joined { .. })).await;
        assert_eq!(
            hub.sessions_of(&UserId::from("u1")).await.expect("sessions").len(),
            2
        );

        hr.force_global_logout("Manual Global Logout", "HR Portal")
            .await
            .expect("command");

        let expected = ExitReason::GlobalLogout {
            initiator: "HR Portal".into(),
            reason: "Manual Global Logout".into(),
        };
        assert_eq!(hr_task.await.expect("hr task"), expected);
        assert_eq!(crm_task.await.expect("crm task"), expected);

        assert!(!hr.logout());
        assert!(!hr.logout());
        hub.shutdown();
    }
}
