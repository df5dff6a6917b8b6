//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use sentinel_core::config::AppConfig;
use sentinel_realtime::SentinelHub;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// The session-control hub
    pub hub: Arc<SentinelHub>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
    /// Cancelled when the server begins shutting down; ends long-lived streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wrap a running hub.
    pub fn new(config: Arc<AppConfig>, hub: Arc<SentinelHub>) -> Self {
        Self {
            config,
            hub,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}
