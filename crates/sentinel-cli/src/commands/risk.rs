//! Risk commands: operator views and manual ingestion.

use std::collections::BTreeMap;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use sentinel_api::dto::response::IngestResponse;
use sentinel_core::error::AppError;
use sentinel_core::types::UserId;
use sentinel_realtime::risk::{RiskEvent, RiskSnapshotEntry, RiskStatus};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for risk commands
#[derive(Debug, Args)]
pub struct RiskArgs {
    /// Risk subcommand
    #[command(subcommand)]
    pub command: RiskCommand,
}

/// Risk subcommands
#[derive(Debug, Subcommand)]
pub enum RiskCommand {
    /// Latest risk per user
    Snapshot,
    /// Recent risk events, newest first
    Activity,
    /// Submit a risk event
    Ingest {
        /// Subject user
        #[arg(long)]
        user: String,
        /// Application the event came from
        #[arg(long, default_value = "Unknown App")]
        app: String,
        /// Score
        #[arg(long)]
        score: f64,
        /// OK, WARN or KILLED
        #[arg(long, value_parser = parse_status)]
        status: RiskStatus,
        /// Contributing reason; repeatable
        #[arg(long = "reason")]
        reasons: Vec<String>,
    },
}

/// Snapshot display row
#[derive(Debug, Serialize, Tabled)]
struct SnapshotRow {
    /// User
    user: String,
    /// Score
    score: f64,
    /// Status
    status: String,
    /// Last application
    app: String,
    /// Updated
    updated: String,
}

/// Activity display row
#[derive(Debug, Serialize, Tabled)]
struct ActivityRow {
    /// Time
    time: String,
    /// User
    user: String,
    /// Application
    app: String,
    /// Score
    score: f64,
    /// Status
    status: String,
    /// Reasons
    reasons: String,
}

fn parse_status(raw: &str) -> Result<RiskStatus, String> {
    match raw.to_ascii_uppercase().as_str() {
        "OK" => Ok(RiskStatus::Ok),
        "WARN" => Ok(RiskStatus::Warn),
        "KILLED" => Ok(RiskStatus::Killed),
        other => Err(format!("unknown status '{other}', expected OK, WARN or KILLED")),
    }
}

/// Execute risk commands
pub async fn execute(
    args: &RiskArgs,
    api: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        RiskCommand::Snapshot => {
            let snapshot: BTreeMap<UserId, RiskSnapshotEntry> = api.get("/risk/snapshot").await?;
            let rows: Vec<SnapshotRow> = snapshot
                .into_iter()
                .map(|(user, entry)| SnapshotRow {
                    user: user.to_string(),
                    score: entry.score,
                    status: entry.status.to_string(),
                    app: entry.last_app,
                    updated: entry.updated_at.format("%H:%M:%S").to_string(),
                })
                .collect();
            output::print_list(&rows, format);
        }
        RiskCommand::Activity => {
            let events: Vec<RiskEvent> = api.get("/risk/activity").await?;
            let rows: Vec<ActivityRow> = events
                .into_iter()
                .map(|e| ActivityRow {
                    time: e.timestamp.format("%H:%M:%S").to_string(),
                    user: e.user_id.to_string(),
                    app: e.app_name,
                    score: e.score,
                    status: e.status.to_string(),
                    reasons: e.reasons.join(", "),
                })
                .collect();
            output::print_list(&rows, format);
        }
        RiskCommand::Ingest {
            user,
            app,
            score,
            status,
            reasons,
        } => {
            let event = RiskEvent {
                user_id: UserId::from(user.as_str()),
                app_name: app.clone(),
                score: *score,
                status: *status,
                reasons: reasons.clone(),
                timestamp: chrono::Utc::now(),
            };
            let response: IngestResponse = api.post("/risk/events", &event).await?;
            match format {
                OutputFormat::Json => output::print_item(&response, format),
                OutputFormat::Table => output::print_success(&format!(
                    "Recorded risk for {} ({:?})",
                    response.user_id, response.class
                )),
            }
        }
    }
    Ok(())
}
