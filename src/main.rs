//! Session Sentinel server.
//!
//! Main entry point that wires the crates together and starts the hub and
//! its HTTP/WebSocket surface.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use sentinel_auth::StaticIdentityProvider;
use sentinel_core::config::AppConfig;
use sentinel_core::error::AppError;
use sentinel_realtime::SentinelHub;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    AppConfig::load(&config_path)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Session Sentinel v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Identity provider ────────────────────────────────
    let identity = StaticIdentityProvider::from_config(&config.auth)?;
    tracing::info!(users = identity.user_count(), "Identity provider ready");
    if identity.user_count() == 0 && config.auth.dev_password.is_none() {
        tracing::warn!("No credentials configured; every reauthentication will fail");
    }

    // ── Step 2: Hub ──────────────────────────────────────────────
    let config = Arc::new(config);
    let hub = SentinelHub::start(&config, Arc::new(identity));

    // ── Step 3: HTTP + WebSocket server ──────────────────────────
    let result = sentinel_api::run_server(Arc::clone(&config), Arc::clone(&hub)).await;

    // ── Step 4: Teardown ─────────────────────────────────────────
    if !hub.is_shut_down() {
        hub.shutdown();
    }
    result
}
