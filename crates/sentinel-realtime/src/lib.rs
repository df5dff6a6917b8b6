//! # sentinel-realtime
//!
//! Real-time session-control hub for Session Sentinel. Provides:
//!
//! - A per-user single-writer executor for all user-keyed state
//! - The session registry and heartbeat-driven eviction
//! - Global logout fan-out to every open application channel
//! - Risk event aggregation with a bounded activity feed and live updates
//! - The step-up reauthentication challenge state machine
//! - The JSON wire protocol spoken with client agents

pub mod connection;
pub mod executor;
pub mod heartbeat;
pub mod message;
pub mod metrics;
pub mod reauth;
pub mod registry;
pub mod risk;
pub mod server;
pub mod session_control;

pub use connection::{ConnectionHandle, ConnectionPool};
pub use message::{InboundMessage, OutboundMessage};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use registry::SessionRegistry;
pub use risk::RiskAggregator;
pub use server::{HubStats, SentinelHub};
pub use session_control::GlobalLogoutBroadcaster;
