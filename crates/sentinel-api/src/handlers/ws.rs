//! WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// GET /ws: WebSocket upgrade for session agents
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(state, remote, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(state: AppState, remote: SocketAddr, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (handle, mut outbound_rx) = state.hub.attach(Some(remote.to_string()));
    let conn_id = handle.id;

    info!(conn_id = %conn_id, remote = %remote, "WebSocket connection established");

    // Outbound forwarder. Queued frames are flushed before a close.
    let closed = handle.closed_token();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn_id = %conn_id, error = %e, "Failed to encode frame");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = closed.cancelled() => break,
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let closed = handle.closed_token();
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.hub.handle_frame(conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "WebSocket read error");
                    break;
                }
            },
        }
    }

    state.hub.on_disconnect(conn_id).await;
    handle.close();
    let _ = writer.await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}
