//! In-process transport straight into a [`SentinelHub`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_realtime::SentinelHub;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};

use super::{Duplex, Transport};

const BUFFER: usize = 64;

/// Attaches to a hub in the same process, skipping serialization.
#[derive(Debug, Clone)]
pub struct HubTransport {
    hub: Arc<SentinelHub>,
}

impl HubTransport {
    /// Attach to `hub`.
    pub fn new(hub: Arc<SentinelHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for HubTransport {
    async fn connect(&self) -> AppResult<Duplex> {
        if self.hub.is_shut_down() {
            return Err(AppError::transport("connect_error: hub is shut down"));
        }

        let (handle, mut from_hub) = self.hub.attach(Some("in-process".to_string()));
        let (outgoing, mut to_hub) = mpsc::channel::<InboundMessage>(BUFFER);
        let (incoming_tx, incoming) = mpsc::channel::<OutboundMessage>(BUFFER);
        let hub = Arc::clone(&self.hub);
        let closed = handle.closed_token();
        let conn_id = handle.id;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    message = to_hub.recv() => match message {
                        Some(message) => {
                            if let Err(e) = hub.handle_message(conn_id, message).await {
                                warn!(conn_id = %conn_id, error = %e, "Inbound message failed");
                            }
                        }
                        None => break,
                    },
                    message = from_hub.recv() => match message {
                        Some(message) => {
                            if incoming_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            hub.on_disconnect(conn_id).await;
        });

        Ok(Duplex { outgoing, incoming })
    }
}
