//! Reauthentication challenge handlers.

use axum::Json;
use axum::extract::{Path, State};

use sentinel_core::error::AppError;
use sentinel_realtime::reauth::ChallengeView;

use crate::dto::request::ChallengeRequest;
use crate::dto::response::{ApiResponse, ChallengeResponse};
use crate::error::ApiError;
use crate::handlers::user_from_path;
use crate::state::AppState;

/// GET /api/reauth/{user_id}
pub async fn challenge_state(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<ChallengeView>>, ApiError> {
    let user_id = user_from_path(user_id)?;
    let view = state.hub.challenge_state(&user_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// POST /api/reauth/{user_id}/challenge
pub async fn issue_challenge(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ApiResponse<ChallengeResponse>>, ApiError> {
    let user_id = user_from_path(user_id)?;
    if req.reason.trim().is_empty() {
        return Err(AppError::validation("reason must not be empty").into());
    }

    let outcome = state.hub.issue_challenge(&user_id, &req.reason).await?;
    Ok(Json(ApiResponse::ok(ChallengeResponse::from_outcome(
        user_id, outcome,
    ))))
}
