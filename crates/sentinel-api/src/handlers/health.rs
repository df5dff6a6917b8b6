//! Health and metrics handlers.

use axum::Json;
use axum::extract::State;

use sentinel_realtime::MetricsSnapshot;

use crate::dto::response::{ApiResponse, HealthResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/health
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    let stats = state.hub.stats().await?;
    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: stats.connections,
        sessions: stats.sessions,
        users: stats.users,
    })))
}

/// GET /api/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::ok(state.hub.metrics.snapshot()))
}
