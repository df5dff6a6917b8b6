//! Transports between an agent and the hub.

pub mod hub;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sentinel_core::result::AppResult;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};

pub use hub::HubTransport;
pub use ws::WsTransport;

/// An established link: typed frames in both directions.
///
/// The link is down once `incoming` yields `None`. Dropping `outgoing`
/// closes it from the agent's side.
#[derive(Debug)]
pub struct Duplex {
    /// Frames to the hub.
    pub outgoing: mpsc::Sender<InboundMessage>,
    /// Frames from the hub.
    pub incoming: mpsc::Receiver<OutboundMessage>,
}

/// Establishes links to the hub.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new link. Failures are `Transport` errors and are retried by
    /// the agent.
    async fn connect(&self) -> AppResult<Duplex>;
}
