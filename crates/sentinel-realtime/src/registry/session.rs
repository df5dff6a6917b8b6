//! Session records held by the registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use sentinel_core::types::{ConnectionId, UserId};

use crate::executor::KeyedState;

/// One open application channel of a user.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owning user.
    pub user_id: UserId,
    /// Branded application name.
    pub app_name: String,
    /// Transport connection carrying the session.
    pub connection_id: ConnectionId,
    /// Wall-clock join time.
    pub joined_at: DateTime<Utc>,
    /// Wall-clock time of the last heartbeat (or the join).
    pub last_heartbeat_at: DateTime<Utc>,
    /// Monotonic time of the last heartbeat, used for staleness.
    pub(crate) last_seen: Instant,
}

impl Session {
    pub(crate) fn new(user_id: UserId, app_name: String, connection_id: ConnectionId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            app_name,
            connection_id,
            joined_at: now,
            last_heartbeat_at: now,
            last_seen: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_heartbeat_at = Utc::now();
        self.last_seen = Instant::now();
    }

    /// Serializable view.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            app_name: self.app_name.clone(),
            connection_id: self.connection_id,
            joined_at: self.joined_at,
            last_heartbeat_at: self.last_heartbeat_at,
        }
    }
}

/// Point-in-time view of a session, as returned by `sessions_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Branded application name.
    pub app_name: String,
    /// Transport connection carrying the session.
    pub connection_id: ConnectionId,
    /// Join time.
    pub joined_at: DateTime<Utc>,
    /// Last heartbeat time.
    pub last_heartbeat_at: DateTime<Utc>,
}

/// All sessions of one user, owned by an executor shard.
#[derive(Debug, Default)]
pub struct UserSessions {
    pub(crate) sessions: HashMap<ConnectionId, Session>,
}

impl KeyedState for UserSessions {
    fn is_idle(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Result of a join.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// A new session was recorded.
    Joined {
        /// Sessions the user now has.
        session_count: usize,
        /// Time since the user's previous join, if any is on record.
        since_previous_join: Option<std::time::Duration>,
    },
    /// The connection was already joined as this user; nothing changed.
    AlreadyJoined {
        /// Sessions the user has.
        session_count: usize,
    },
    /// The connection is joined as a different user.
    Conflict {
        /// The user the connection belongs to.
        owner: UserId,
    },
}

impl JoinOutcome {
    /// Session count after the join, if it was accepted.
    pub fn session_count(&self) -> Option<usize> {
        match self {
            Self::Joined { session_count, .. } | Self::AlreadyJoined { session_count } => {
                Some(*session_count)
            }
            Self::Conflict { .. } => None,
        }
    }
}

/// A session removed by `leave` or eviction.
#[derive(Debug, Clone)]
pub struct Departure {
    /// The removed session.
    pub session: Session,
    /// Sessions the user still has; zero means fully signed out.
    pub remaining: usize,
}
