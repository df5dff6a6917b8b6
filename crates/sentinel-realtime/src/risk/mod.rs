//! Risk telemetry: events, classification, aggregation and join scoring.

pub mod aggregator;
pub mod detector;
pub mod event;

pub use aggregator::{RiskAggregator, RiskSnapshotEntry};
pub use detector::{JoinContext, JoinRiskDetector};
pub use event::{RiskClass, RiskEvent, RiskStatus, classify};
