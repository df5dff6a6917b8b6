//! A single attached transport connection.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_core::types::ConnectionId;

use crate::message::types::OutboundMessage;

/// Hub-side handle to one open application channel.
///
/// The transport task owns the receiving half of `sender` and writes
/// whatever arrives to the wire. Cancelling `closed` asks that task to hang
/// up.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Peer address, if the transport knows it.
    pub remote: Option<String>,
    /// When the transport attached.
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Wrap the sending half of a connection's outbound queue.
    pub fn new(sender: mpsc::Sender<OutboundMessage>, remote: Option<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            remote,
            connected_at: Utc::now(),
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// Queue a message, waiting at most `timeout` for buffer space.
    pub async fn send(&self, message: OutboundMessage, timeout: Duration) -> AppResult<()> {
        if self.is_closed() {
            return Err(AppError::transport(format!("Connection {} is closed", self.id)));
        }
        match self.sender.send_timeout(message, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(AppError::timeout(format!(
                "Connection {} did not accept a message within {}ms",
                self.id,
                timeout.as_millis()
            ))),
            Err(SendTimeoutError::Closed(_)) => {
                self.close();
                Err(AppError::transport(format!("Connection {} is gone", self.id)))
            }
        }
    }

    /// Ask the transport task to hang up.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection was closed by either side.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    /// Token cancelled when the connection should hang up.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
