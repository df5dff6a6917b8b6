//! Global logout fan-out.

pub mod broadcaster;
pub mod signal;

pub use broadcaster::{BroadcastReport, GlobalLogoutBroadcaster};
pub use signal::ControlSignal;
