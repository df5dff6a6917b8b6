//! Wire messages exchanged between agents and the hub.

pub mod types;
pub mod validator;

pub use types::{InboundMessage, OutboundMessage};
