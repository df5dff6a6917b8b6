//! Run a session agent from the terminal.
//!
//! Joins the hub over WebSocket as one application channel, heartbeats,
//! and prompts for the password when the hub asks for reauthentication.
//! Ctrl+C performs a local logout.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::warn;

use sentinel_agent::{
    AgentConfig, AgentEvent, AgentHandle, ExitReason, SessionAgent, WsTransport,
};
use sentinel_core::config::AppConfig;
use sentinel_core::error::AppError;

use crate::output;

/// Arguments for the agent command
#[derive(Debug, Args)]
pub struct AgentArgs {
    /// User to join as
    #[arg(long)]
    pub user: String,

    /// Application name to join with
    #[arg(long, default_value = "Unknown App")]
    pub app: String,

    /// Hub WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8000/ws")]
    pub url: String,

    /// Heartbeat interval in seconds [default: `heartbeat.interval_seconds` from the config]
    #[arg(long)]
    pub heartbeat_seconds: Option<u64>,

    /// Exit on a wrong password, not only on an expired challenge
    #[arg(long)]
    pub strict: bool,

    /// Ask the hub to log this user out everywhere once joined
    #[arg(long)]
    pub logout_all: bool,
}

/// Execute the agent command
pub async fn execute(args: &AgentArgs, config_path: &str) -> Result<(), AppError> {
    let hub_config = super::load_config(config_path)?;
    let mut config = AgentConfig::new(args.user.as_str(), args.app.clone());
    config.heartbeat_interval = heartbeat_interval(args, &hub_config);
    config.terminate_on_reauth_failure = args.strict;

    let transport = Arc::new(WsTransport::new(args.url.clone()));
    let (handle, mut events, task) = SessionAgent::spawn(config, transport);
    let mut logout_sent = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.logout();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, AgentEvent::Joined { .. }) && args.logout_all && !logout_sent {
                    logout_sent = true;
                    handle
                        .force_global_logout("Manual Global Logout", args.app.clone())
                        .await?;
                }
                on_event(&handle, event);
            }
        }
    }

    let exit = task
        .await
        .map_err(|e| AppError::internal(format!("Agent task failed: {}", e)))?;
    match exit {
        ExitReason::LocalLogout => output::print_success("Logged out"),
        ExitReason::GlobalLogout { initiator, reason } => {
            output::print_warning(&format!("Logged out everywhere by {}: {}", initiator, reason))
        }
        ExitReason::ReauthFailed { outcome } => {
            output::print_warning(&format!("Reauthentication {:?}; session ended", outcome))
        }
        ExitReason::GaveUp { attempts } => {
            return Err(AppError::transport(format!(
                "Could not reach the hub after {} attempts",
                attempts
            )));
        }
    }
    Ok(())
}

/// `--heartbeat-seconds`, else the interval the hub is configured for.
fn heartbeat_interval(args: &AgentArgs, hub_config: &AppConfig) -> Duration {
    let seconds = args
        .heartbeat_seconds
        .unwrap_or(hub_config.heartbeat.interval_seconds);
    Duration::from_secs(seconds.max(1))
}

fn on_event(handle: &AgentHandle, event: AgentEvent) {
    match event {
        AgentEvent::StateChanged(state) => println!("  state: {}", state),
        AgentEvent::ConnectError { message } => output::print_warning(&message),
        AgentEvent::Joined { session_count } => output::print_success(&format!(
            "Joined ({} open sessions)",
            session_count
        )),
        AgentEvent::RiskUpdate {
            user_id,
            app_name,
            score,
            status,
            reasons,
        } => println!(
            "  risk: {} {} {} {} [{}]",
            user_id,
            app_name,
            score,
            status,
            reasons.join(", ")
        ),
        AgentEvent::ReauthRequired {
            reason,
            expires_in_seconds,
            ..
        } => {
            output::print_warning(&format!(
                "Reauthentication required: {} ({}s to answer)",
                reason, expires_in_seconds
            ));
            prompt_password(handle.clone());
        }
        AgentEvent::ReauthSucceeded => output::print_success("Reauthenticated"),
        AgentEvent::ReauthFailed { message, .. } => output::print_error(&message),
        AgentEvent::HubError { code, message } => {
            output::print_error(&format!("{}: {}", code, message))
        }
        AgentEvent::Terminated(_) => {}
    }
}

fn prompt_password(handle: AgentHandle) {
    tokio::spawn(async move {
        let answer = tokio::task::spawn_blocking(|| {
            dialoguer::Password::new()
                .with_prompt("Password")
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(password)) => {
                if let Err(e) = handle.verify(password).await {
                    warn!(error = %e, "Could not send verification");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Password prompt failed"),
            Err(e) => warn!(error = %e, "Password prompt task failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(heartbeat_seconds: Option<u64>) -> AgentArgs {
        AgentArgs {
            user: "u1".to_string(),
            app: "HR Portal".to_string(),
            url: "ws://127.0.0.1:8000/ws".to_string(),
            heartbeat_seconds,
            strict: false,
            logout_all: false,
        }
    }

    #[test]
    fn test_heartbeat_interval_follows_config() {
        let mut config = AppConfig::default();
        config.heartbeat.interval_seconds = 45;
        assert_eq!(heartbeat_interval(&args(None), &config), Duration::from_secs(45));
    }

    #[test]
    fn test_heartbeat_flag_overrides_config() {
        let config = AppConfig::default();
        assert_eq!(heartbeat_interval(&args(Some(10)), &config), Duration::from_secs(10));
        assert_eq!(heartbeat_interval(&args(Some(0)), &config), Duration::from_secs(1));
    }
}
