//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every section falls back to its defaults when absent.

pub mod app;
pub mod auth;
pub mod hub;
pub mod logging;
pub mod reauth;
pub mod risk;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::AuthConfig;
pub use self::hub::{HeartbeatConfig, HubConfig};
pub use self::logging::LoggingConfig;
pub use self::reauth::ReauthConfig;
pub use self::risk::{DetectorConfig, RiskConfig};

use crate::error::AppError;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "SENTINEL";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Hub transport and executor settings.
    #[serde(default)]
    pub hub: HubConfig,
    /// Heartbeat liveness settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Risk aggregation settings.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Step-up reauthentication settings.
    #[serde(default)]
    pub reauth: ReauthConfig,
    /// Identity provider settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// The file at `path` is optional. An environment overlay named by
    /// `SENTINEL_ENV` (`config/{env}.toml`) is merged on top, then
    /// environment variables prefixed with `SENTINEL__`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let env = std::env::var("SENTINEL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject combinations that would break liveness or challenge timing.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.heartbeat.timeout_seconds <= self.heartbeat.interval_seconds {
            return Err(AppError::configuration(format!(
                "heartbeat.timeout_seconds ({}) must exceed heartbeat.interval_seconds ({})",
                self.heartbeat.timeout_seconds, self.heartbeat.interval_seconds
            )));
        }
        if self.hub.shard_count == 0 {
            return Err(AppError::configuration("hub.shard_count must be at least 1"));
        }
        if self.reauth.challenge_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "reauth.challenge_timeout_seconds must be positive",
            ));
        }
        if self.risk.activity_log_capacity == 0 {
            return Err(AppError::configuration(
                "risk.activity_log_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
