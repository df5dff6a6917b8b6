//! Hub metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic hub counters.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Connections attached.
    pub connections_total: AtomicU64,
    /// Sessions joined.
    pub joins: AtomicU64,
    /// Sessions ended by `leave` or disconnect.
    pub leaves: AtomicU64,
    /// Sessions evicted for missing heartbeats.
    pub evictions: AtomicU64,
    /// Global logouts performed.
    pub logouts_broadcast: AtomicU64,
    /// `LOGOUT_ALL` frames queued.
    pub logout_deliveries: AtomicU64,
    /// `LOGOUT_ALL` frames that could not be queued.
    pub logout_delivery_failures: AtomicU64,
    /// Risk events ingested.
    pub risk_events: AtomicU64,
    /// Challenges issued.
    pub challenges_issued: AtomicU64,
    /// Challenges verified.
    pub challenges_verified: AtomicU64,
    /// Challenges failed.
    pub challenges_failed: AtomicU64,
    /// Challenges expired.
    pub challenges_expired: AtomicU64,
    /// Frames dropped as malformed or unauthorized.
    pub protocol_errors: AtomicU64,
}

impl HubMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_total: load(&self.connections_total),
            joins: load(&self.joins),
            leaves: load(&self.leaves),
            evictions: load(&self.evictions),
            logouts_broadcast: load(&self.logouts_broadcast),
            logout_deliveries: load(&self.logout_deliveries),
            logout_delivery_failures: load(&self.logout_delivery_failures),
            risk_events: load(&self.risk_events),
            challenges_issued: load(&self.challenges_issued),
            challenges_verified: load(&self.challenges_verified),
            challenges_failed: load(&self.challenges_failed),
            challenges_expired: load(&self.challenges_expired),
            protocol_errors: load(&self.protocol_errors),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub joins: u64,
    pub leaves: u64,
    pub evictions: u64,
    pub logouts_broadcast: u64,
    pub logout_deliveries: u64,
    pub logout_delivery_failures: u64,
    pub risk_events: u64,
    pub challenges_issued: u64,
    pub challenges_verified: u64,
    pub challenges_failed: u64,
    pub challenges_expired: u64,
    pub protocol_errors: u64,
}
