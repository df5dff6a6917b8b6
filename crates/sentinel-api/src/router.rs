//! Route definitions for the Session Sentinel HTTP API.
//!
//! Operator routes are mounted under `/api`; agents connect on `/ws`.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health_routes())
        .merge(session_routes())
        .merge(risk_routes())
        .merge(reauth_routes());

    let ws_routes = Router::new().route("/ws", get(handlers::ws::ws_upgrade));

    let cors = middleware::cors::build_cors_layer(&state.config.server.cors);

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Liveness and counters
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
}

/// Session inspection and global logout
fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/{user_id}", get(handlers::sessions::list_sessions))
        .route(
            "/sessions/{user_id}/logout",
            post(handlers::sessions::logout_all),
        )
}

/// Risk ingestion and operator views
fn risk_routes() -> Router<AppState> {
    Router::new()
        .route("/risk/events", post(handlers::risk::ingest))
        .route("/risk/snapshot", get(handlers::risk::snapshot))
        .route("/risk/activity", get(handlers::risk::activity))
        .route("/risk/stream", get(handlers::risk::stream))
}

/// Reauthentication challenges
fn reauth_routes() -> Router<AppState> {
    Router::new()
        .route("/reauth/{user_id}", get(handlers::reauth::challenge_state))
        .route(
            "/reauth/{user_id}/challenge",
            post(handlers::reauth::issue_challenge),
        )
}
