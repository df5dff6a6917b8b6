//! Session registry: which channels are open for which user.
//!
//! Per-user session sets live inside a [`KeyedExecutor`], so every mutation
//! for a user is applied by a single writer. A connection-to-user index
//! sits beside it for routing messages that only carry a connection id; it
//! is only written from inside the owning user's shard. The same holds for
//! the per-user time of the last join, which outlives the user's sessions.

pub mod session;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sentinel_core::result::AppResult;
use sentinel_core::types::{ConnectionId, UserId};

use crate::executor::KeyedExecutor;

pub use session::{Departure, JoinOutcome, Session, SessionInfo, UserSessions};

/// How long a user's last join time is kept after it was recorded.
const LAST_JOIN_RETENTION: Duration = Duration::from_secs(3600);

/// Authoritative directory of open sessions.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    executor: KeyedExecutor<UserSessions>,
    index: Arc<DashMap<ConnectionId, UserId>>,
    last_joins: Arc<DashMap<UserId, Instant>>,
}

impl SessionRegistry {
    /// Start the registry's executor shards.
    pub fn new(shard_count: usize, shutdown: CancellationToken) -> Self {
        Self {
            executor: KeyedExecutor::spawn("registry", shard_count, shutdown),
            index: Arc::new(DashMap::new()),
            last_joins: Arc::new(DashMap::new()),
        }
    }

    /// Record `connection_id` as a session of `user_id`.
    ///
    /// Joining again on the same connection is a no-op. A connection that
    /// already belongs to another user is refused.
    pub async fn join(
        &self,
        user_id: &UserId,
        app_name: &str,
        connection_id: ConnectionId,
    ) -> AppResult<JoinOutcome> {
        if let Some(owner) = self.owner_of(&connection_id) {
            if &owner != user_id {
                return Ok(JoinOutcome::Conflict { owner });
            }
        }

        let index = Arc::clone(&self.index);
        let last_joins = Arc::clone(&self.last_joins);
        let user = user_id.clone();
        let app_name = app_name.to_string();
        self.executor
            .run(user_id, move |state| {
                if state.sessions.contains_key(&connection_id) {
                    return JoinOutcome::AlreadyJoined {
                        session_count: state.sessions.len(),
                    };
                }
                let now = Instant::now();
                let since_previous_join = last_joins
                    .insert(user.clone(), now)
                    .map(|at| now.duration_since(at));
                state
                    .sessions
                    .insert(connection_id, Session::new(user.clone(), app_name, connection_id));
                index.insert(connection_id, user);
                JoinOutcome::Joined {
                    session_count: state.sessions.len(),
                    since_previous_join,
                }
            })
            .await
    }

    /// Remove the session carried by `connection_id`, if any.
    pub async fn leave(&self, connection_id: &ConnectionId) -> AppResult<Option<Departure>> {
        let Some(user_id) = self.owner_of(connection_id) else {
            return Ok(None);
        };

        let index = Arc::clone(&self.index);
        let connection_id = *connection_id;
        self.executor
            .run(&user_id, move |state| {
                let session = state.sessions.remove(&connection_id)?;
                index.remove_if(&connection_id, |_, owner| owner == &session.user_id);
                Some(Departure {
                    session,
                    remaining: state.sessions.len(),
                })
            })
            .await
    }

    /// Refresh liveness. Returns `false` if no such session is registered.
    pub async fn heartbeat(
        &self,
        user_id: &UserId,
        connection_id: &ConnectionId,
    ) -> AppResult<bool> {
        let connection_id = *connection_id;
        self.executor
            .run(user_id, move |state| match state.sessions.get_mut(&connection_id) {
                Some(session) => {
                    session.touch();
                    true
                }
                None => false,
            })
            .await
    }

    /// Point-in-time snapshot of a user's sessions, oldest first.
    pub async fn sessions_of(&self, user_id: &UserId) -> AppResult<Vec<SessionInfo>> {
        self.executor
            .run(user_id, |state| {
                let mut sessions: Vec<SessionInfo> =
                    state.sessions.values().map(Session::info).collect();
                sessions.sort_by(|a, b| {
                    a.joined_at
                        .cmp(&b.joined_at)
                        .then(a.connection_id.cmp(&b.connection_id))
                });
                sessions
            })
            .await
    }

    /// Atomically remove and return every session of a user.
    ///
    /// Sessions joining after the drain are untouched.
    pub async fn drain(&self, user_id: &UserId) -> AppResult<Vec<Session>> {
        let index = Arc::clone(&self.index);
        self.executor
            .run(user_id, move |state| {
                let drained: Vec<Session> = state.sessions.drain().map(|(_, s)| s).collect();
                for session in &drained {
                    index.remove_if(&session.connection_id, |_, owner| owner == &session.user_id);
                }
                drained
            })
            .await
    }

    /// Remove every session whose last heartbeat is older than `max_age`.
    pub async fn evict_stale(&self, max_age: Duration) -> AppResult<Vec<Departure>> {
        let index = Arc::clone(&self.index);
        let per_shard = self
            .executor
            .run_all(move |states| {
                let now = Instant::now();
                let mut evicted = Vec::new();
                for state in states.values_mut() {
                    let stale: Vec<ConnectionId> = state
                        .sessions
                        .values()
                        .filter(|s| now.duration_since(s.last_seen) > max_age)
                        .map(|s| s.connection_id)
                        .collect();
                    for connection_id in stale {
                        if let Some(session) = state.sessions.remove(&connection_id) {
                            index.remove_if(&connection_id, |_, owner| owner == &session.user_id);
                            evicted.push(Departure {
                                session,
                                remaining: state.sessions.len(),
                            });
                        }
                    }
                }
                evicted
            })
            .await?;

        self.last_joins
            .retain(|_, at| at.elapsed() <= LAST_JOIN_RETENTION);

        let evicted: Vec<Departure> = per_shard.into_iter().flatten().collect();
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted stale sessions");
        }
        Ok(evicted)
    }

    /// The user a connection joined as.
    pub fn owner_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.index.get(connection_id).map(|entry| entry.value().clone())
    }

    /// Total registered sessions across all users.
    pub fn session_count(&self) -> usize {
        self.index.len()
    }

    /// Number of users with at least one session.
    pub async fn user_count(&self) -> AppResult<usize> {
        let counts = self.executor.run_all(|states| states.len()).await?;
        Ok(counts.into_iter().sum())
    }
}
