//! Application builder and server runner.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sentinel_core::config::AppConfig;
use sentinel_core::error::AppError;
use sentinel_realtime::SentinelHub;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Serve on `listener` until `shutdown` resolves, then drain.
///
/// The hub is shut down once the signal fires so agent sockets close and
/// the server can finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(state.clone());
    let hub = Arc::clone(&state.hub);
    let stop = state.shutdown.clone();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutdown signal received");
        stop.cancel();
        hub.shutdown();
    })
    .await
    .map_err(|e| AppError::internal(format!("Server error: {e}")))
}

/// Runs the Session Sentinel server with the given configuration and hub.
pub async fn run_server(config: Arc<AppConfig>, hub: Arc<SentinelHub>) -> Result<(), AppError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(config, hub);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Session Sentinel listening on {}", addr);

    let server = serve(listener, state.clone(), shutdown_signal());
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = async {
            state.shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "Graceful shutdown timed out");
        }
    }

    info!("Server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
