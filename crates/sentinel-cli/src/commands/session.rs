//! Session inspection and global logout.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use sentinel_api::dto::request::LogoutRequest;
use sentinel_api::dto::response::{LogoutResponse, SessionsResponse};
use sentinel_core::error::AppError;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for `sessions`
#[derive(Debug, Args)]
pub struct SessionsArgs {
    /// User ID
    pub user_id: String,
}

/// Arguments for `logout`
#[derive(Debug, Args)]
pub struct LogoutArgs {
    /// User ID
    pub user_id: String,
    /// Reason shown to the user
    #[arg(long, default_value = "Manual Global Logout")]
    pub reason: String,
    /// Recorded initiator
    #[arg(long, default_value = "Operator")]
    pub initiator: String,
    /// Skip confirmation
    #[arg(long)]
    pub force: bool,
}

/// Session display row
#[derive(Debug, Serialize, Tabled)]
struct SessionRow {
    /// Application
    app: String,
    /// Connection ID
    connection: String,
    /// Joined
    joined: String,
    /// Last heartbeat
    last_heartbeat: String,
}

/// Execute `sessions`
pub async fn list(
    args: &SessionsArgs,
    api: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    let response: SessionsResponse = api.get(&format!("/sessions/{}", args.user_id)).await?;

    let rows: Vec<SessionRow> = response
        .sessions
        .iter()
        .map(|s| SessionRow {
            app: s.app_name.clone(),
            connection: s.connection_id.to_string(),
            joined: s.joined_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            last_heartbeat: s.last_heartbeat_at.format("%H:%M:%S").to_string(),
        })
        .collect();

    output::print_list(&rows, format);
    Ok(())
}

/// Execute `logout`
pub async fn logout(
    args: &LogoutArgs,
    api: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    if !args.force {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!("Log {} out of every application?", args.user_id))
            .default(false)
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let request = LogoutRequest {
        initiator: args.initiator.clone(),
        reason: args.reason.clone(),
    };
    let response: LogoutResponse = api
        .post(&format!("/sessions/{}/logout", args.user_id), &request)
        .await?;

    match format {
        OutputFormat::Json => output::print_item(&response, format),
        OutputFormat::Table => {
            let report = &response.report;
            output::print_success(&format!(
                "Logged out {}: {} of {} sessions notified",
                response.user_id, report.delivered, report.total
            ));
            if report.failed > 0 {
                output::print_warning(&format!("{} sessions could not be reached", report.failed));
            }
        }
    }
    Ok(())
}
