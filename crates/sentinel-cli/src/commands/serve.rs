//! Start the Session Sentinel server.

use std::sync::Arc;

use clap::Args;

use sentinel_auth::StaticIdentityProvider;
use sentinel_core::error::AppError;
use sentinel_realtime::SentinelHub;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server host
    #[arg(long)]
    pub host: Option<String>,
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, config_path: &str) -> Result<(), AppError> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }

    println!("Starting Session Sentinel...");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);

    let identity = StaticIdentityProvider::from_config(&config.auth)?;
    if identity.user_count() == 0 && config.auth.dev_password.is_none() {
        crate::output::print_warning("No credentials configured; every reauthentication will fail");
    }

    let config = Arc::new(config);
    let hub = SentinelHub::start(&config, Arc::new(identity));
    sentinel_api::run_server(config, hub).await
}
