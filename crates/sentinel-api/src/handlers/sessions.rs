//! Session inspection and operator logout.

use axum::Json;
use axum::extract::{Path, State};
use tracing::info;

use crate::dto::request::LogoutRequest;
use crate::dto::response::{ApiResponse, LogoutResponse, SessionsResponse};
use crate::error::ApiError;
use crate::handlers::user_from_path;
use crate::state::AppState;

/// GET /api/sessions/{user_id}
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<SessionsResponse>>, ApiError> {
    let user_id = user_from_path(user_id)?;
    let sessions = state.hub.sessions_of(&user_id).await?;
    Ok(Json(ApiResponse::ok(SessionsResponse { user_id, sessions })))
}

/// POST /api/sessions/{user_id}/logout
pub async fn logout_all(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<ApiResponse<LogoutResponse>>, ApiError> {
    let user_id = user_from_path(user_id)?;
    info!(user_id = %user_id, initiator = %req.initiator, "Operator global logout");

    let report = state
        .hub
        .force_logout(&user_id, &req.initiator, &req.reason)
        .await?;
    Ok(Json(ApiResponse::ok(LogoutResponse { user_id, report })))
}
