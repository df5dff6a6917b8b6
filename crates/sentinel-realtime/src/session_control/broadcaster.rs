//! Fan-out of `LOGOUT_ALL` to every session of a user.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_core::types::{ConnectionId, UserId};

use super::signal::ControlSignal;
use crate::connection::ConnectionPool;
use crate::message::types::OutboundMessage;
use crate::registry::{Session, SessionRegistry};

/// Outcome of one global logout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    /// Sessions registered when the broadcast read the registry.
    pub total: usize,
    /// Sessions the signal was queued for.
    pub delivered: usize,
    /// Sessions whose send failed or timed out.
    pub failed: usize,
    /// Connections the signal was queued for.
    #[serde(skip)]
    pub recipients: Vec<ConnectionId>,
    /// Connections removed from the registry but not reached.
    #[serde(skip)]
    pub undelivered: Vec<ConnectionId>,
}

impl BroadcastReport {
    /// Every connection whose session the broadcast ended.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionId> {
        self.recipients.iter().chain(self.undelivered.iter())
    }
}

/// Delivers `LOGOUT_ALL` to every session a user has open.
#[derive(Debug, Clone)]
pub struct GlobalLogoutBroadcaster {
    registry: SessionRegistry,
    connections: Arc<ConnectionPool>,
    send_timeout: Duration,
}

impl GlobalLogoutBroadcaster {
    /// Creates a broadcaster over the given registry and pool.
    pub fn new(
        registry: SessionRegistry,
        connections: Arc<ConnectionPool>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connections,
            send_timeout,
        }
    }

    /// Terminate every session `user_id` has open right now.
    ///
    /// The user's sessions are removed from the registry in one step, then
    /// the signal is sent to each of them concurrently. Sessions that join
    /// afterwards are not affected. Calling again with nothing registered is
    /// a no-op that reports zero recipients.
    pub async fn trigger(
        &self,
        user_id: &UserId,
        initiator: &str,
        reason: &str,
    ) -> AppResult<BroadcastReport> {
        let sessions = self.registry.drain(user_id).await?;
        let signal = ControlSignal::new(user_id.clone(), initiator, reason);
        let message = OutboundMessage::from(&signal);

        info!(
            user_id = %user_id,
            initiator = %initiator,
            reason = %reason,
            sessions = sessions.len(),
            "Global logout"
        );

        let results = join_all(
            sessions
                .iter()
                .map(|session| self.deliver(session, message.clone())),
        )
        .await;

        let mut report = BroadcastReport {
            total: sessions.len(),
            ..Default::default()
        };
        for (session, result) in sessions.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    report.recipients.push(session.connection_id);
                }
                Err(e) => {
                    report.failed += 1;
                    report.undelivered.push(session.connection_id);
                    warn!(
                        user_id = %user_id,
                        conn_id = %session.connection_id,
                        app = %session.app_name,
                        error = %e,
                        "LOGOUT_ALL delivery failed"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn deliver(&self, session: &Session, message: OutboundMessage) -> AppResult<()> {
        let handle = self.connections.get(&session.connection_id).ok_or_else(|| {
            AppError::transport(format!(
                "Connection {} already detached",
                session.connection_id
            ))
        })?;
        handle.send(message, self.send_timeout).await
    }
}
