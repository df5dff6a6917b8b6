//! # sentinel-agent
//!
//! The peer that runs inside every application channel. It connects to the
//! hub, joins as its user, heartbeats, reconnects with bounded backoff and
//! reacts to `LOGOUT_ALL` and reauthentication events.

pub mod agent;
pub mod backoff;
pub mod state;
pub mod transport;

pub use agent::{AgentCommand, AgentConfig, AgentEvent, AgentHandle, SessionAgent};
pub use state::{AgentStatus, ConnectionState, ExitReason, PendingChallenge};
pub use transport::{Duplex, HubTransport, Transport, WsTransport};
