//! Risk ingestion, operator views and the live stream.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use sentinel_core::types::UserId;
use sentinel_realtime::message::OutboundMessage;
use sentinel_realtime::risk::{RiskEvent, RiskSnapshotEntry};

use crate::dto::response::{ApiResponse, IngestResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/risk/events
pub async fn ingest(
    State(state): State<AppState>,
    Json(event): Json<RiskEvent>,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let user_id = event.user_id.clone();
    let class = state.hub.ingest_risk(event).await?;
    Ok(Json(ApiResponse::ok(IngestResponse { user_id, class })))
}

/// GET /api/risk/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
) -> Json<ApiResponse<BTreeMap<UserId, RiskSnapshotEntry>>> {
    Json(ApiResponse::ok(state.hub.risk.current_snapshot()))
}

/// GET /api/risk/activity
pub async fn activity(State(state): State<AppState>) -> Json<ApiResponse<Vec<RiskEvent>>> {
    Json(ApiResponse::ok(state.hub.risk.activity()))
}

/// GET /api/risk/stream
///
/// Server-sent `RISK_UPDATE` events, one per ingested risk event.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = futures::stream::unfold(state.hub.subscribe_risk(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let update = OutboundMessage::from(&event);
                    match Event::default().event(update.event_name()).json_data(&update) {
                        Ok(sse) => return Some((Ok::<_, Infallible>(sse), rx)),
                        Err(e) => warn!(error = %e, "Failed to encode risk update"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Risk stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let stream = updates.take_until(state.shutdown.clone().cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
