//! Hub transport, executor and heartbeat configuration.

use serde::{Deserialize, Serialize};

/// Hub connection and per-user executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Outbound message buffer size per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Bounded per-recipient send timeout in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Number of executor shards serializing per-user mutation.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Application names whose channels also receive `RISK_UPDATE`.
    #[serde(default = "default_operator_apps")]
    pub operator_apps: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            shard_count: default_shard_count(),
            max_message_bytes: default_max_message_bytes(),
            operator_apps: default_operator_apps(),
        }
    }
}

/// Heartbeat liveness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval agents send heartbeats at, in seconds. The hub only checks
    /// it against `timeout_seconds`; `sentinel agent` uses it as its default.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// A session with no heartbeat for longer than this is stale.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// How often the monitor sweeps for stale sessions.
    #[serde(default = "default_sweep")]
    pub sweep_interval_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            timeout_seconds: default_timeout(),
            sweep_interval_seconds: default_sweep(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}

fn default_send_timeout_ms() -> u64 {
    2000
}

fn default_shard_count() -> usize {
    16
}

fn default_max_message_bytes() -> usize {
    65_536
}

fn default_operator_apps() -> Vec<String> {
    vec!["Admin Console".to_string()]
}

fn default_interval() -> u64 {
    120
}

fn default_timeout() -> u64 {
    360
}

fn default_sweep() -> u64 {
    30
}
