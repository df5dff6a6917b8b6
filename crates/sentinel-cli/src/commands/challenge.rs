//! Reauthentication challenge commands.

use clap::{Args, Subcommand};

use sentinel_api::dto::request::ChallengeRequest;
use sentinel_api::dto::response::ChallengeResponse;
use sentinel_core::error::AppError;
use sentinel_realtime::reauth::ChallengeView;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for challenge commands
#[derive(Debug, Args)]
pub struct ChallengeArgs {
    /// Challenge subcommand
    #[command(subcommand)]
    pub command: ChallengeCommand,
}

/// Challenge subcommands
#[derive(Debug, Subcommand)]
pub enum ChallengeCommand {
    /// Ask every session of a user to re-enter the password
    Issue {
        /// User ID
        user_id: String,
        /// Reason shown to the user
        #[arg(long, default_value = "Suspicious activity detected")]
        reason: String,
    },
    /// Show a user's challenge state
    Status {
        /// User ID
        user_id: String,
    },
}

/// Execute challenge commands
pub async fn execute(
    args: &ChallengeArgs,
    api: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ChallengeCommand::Issue { user_id, reason } => {
            let request = ChallengeRequest {
                reason: reason.clone(),
            };
            let response: ChallengeResponse = api
                .post(&format!("/reauth/{}/challenge", user_id), &request)
                .await?;

            match (format, response.outcome.as_str()) {
                (OutputFormat::Json, _) => output::print_item(&response, format),
                (_, "issued") => output::print_success(&format!("Challenge issued to {}", user_id)),
                (_, "already_pending") => {
                    output::print_warning(&format!("{} already has a pending challenge", user_id))
                }
                _ => output::print_warning(&format!("{} verified recently; no challenge issued", user_id)),
            }
        }
        ChallengeCommand::Status { user_id } => {
            let view: ChallengeView = api.get(&format!("/reauth/{}", user_id)).await?;
            output::print_item(&view, format);
        }
    }
    Ok(())
}
