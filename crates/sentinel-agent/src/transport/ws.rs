//! WebSocket transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use sentinel_core::error::AppError;
use sentinel_core::result::AppResult;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};

use super::{Duplex, Transport};

/// Frames buffered per direction.
const BUFFER: usize = 64;

/// Connects to the hub's `/ws` endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Target `url`, e.g. `ws://127.0.0.1:8000/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> AppResult<Duplex> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| AppError::transport(format!("connect_error: {e}")))?;
        debug!(url = %self.url, "WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<InboundMessage>(BUFFER);
        let (incoming_tx, incoming) = mpsc::channel::<OutboundMessage>(BUFFER);

        // Writer: agent frames to the socket.
        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                if sink.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: socket frames to the agent.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                };
                match serde_json::from_str::<OutboundMessage>(text.as_str()) {
                    Ok(message) => {
                        if incoming_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed frame from hub"),
                }
            }
            debug!("WebSocket reader stopped");
        });

        Ok(Duplex { outgoing, incoming })
    }
}
