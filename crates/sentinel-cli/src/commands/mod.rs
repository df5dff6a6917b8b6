//! CLI command definitions and dispatch.

pub mod agent;
pub mod challenge;
pub mod hash_password;
pub mod risk;
pub mod serve;
pub mod session;

use clap::{Parser, Subcommand};

use sentinel_core::config::AppConfig;
use sentinel_core::error::AppError;

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// Session Sentinel: cross-application session control
#[derive(Debug, Parser)]
#[command(name = "sentinel", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Base URL of a running server, for operator commands
    #[arg(long, env = "SENTINEL_URL", default_value = "http://127.0.0.1:8000")]
    pub server: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the Session Sentinel server
    Serve(serve::ServeArgs),
    /// Run a session agent for one application channel
    Agent(agent::AgentArgs),
    /// List a user's open sessions
    Sessions(session::SessionsArgs),
    /// Log a user out of every application
    Logout(session::LogoutArgs),
    /// Risk events and operator views
    Risk(risk::RiskArgs),
    /// Reauthentication challenges
    Challenge(challenge::ChallengeArgs),
    /// Hash a password for the `auth.users` table
    HashPassword(hash_password::HashPasswordArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let api = || ApiClient::new(&self.server);
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.config).await,
            Commands::Agent(args) => agent::execute(args, &self.config).await,
            Commands::Sessions(args) => session::list(args, &api(), self.format).await,
            Commands::Logout(args) => session::logout(args, &api(), self.format).await,
            Commands::Risk(args) => risk::execute(args, &api(), self.format).await,
            Commands::Challenge(args) => challenge::execute(args, &api(), self.format).await,
            Commands::HashPassword(args) => hash_password::execute(args),
        }
    }

    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_log_level(&self) -> &'static str {
        match self.command {
            Commands::Serve(_) | Commands::Agent(_) => "info",
            _ => "warn",
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}
