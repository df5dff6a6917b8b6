//! Liveness tracking and stale-session eviction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_core::config::HeartbeatConfig;
use sentinel_core::result::AppResult;

use crate::registry::{Departure, SessionRegistry};

/// Receives sessions the monitor evicted.
#[async_trait]
pub trait EvictionListener: Send + Sync + 'static {
    /// Called once per evicted session, after it left the registry.
    async fn on_evicted(&self, departure: Departure);
}

/// Periodically evicts sessions that stopped heartbeating.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    registry: SessionRegistry,
    timeout: Duration,
    sweep_interval: Duration,
}

impl HeartbeatMonitor {
    /// Creates a monitor over `registry`.
    pub fn new(registry: SessionRegistry, config: &HeartbeatConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(config.timeout_seconds),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds.max(1)),
        }
    }

    /// Evict every session silent for longer than the timeout.
    pub async fn sweep(&self) -> AppResult<Vec<Departure>> {
        self.registry.evict_stale(self.timeout).await
    }

    /// Sweep on an interval until `shutdown` is cancelled.
    pub async fn run(self, listener: Arc<dyn EvictionListener>, shutdown: CancellationToken) {
        let mut interval = time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            timeout_secs = self.timeout.as_secs(),
            sweep_secs = self.sweep_interval.as_secs(),
            "Heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.sweep().await {
                Ok(evicted) => {
                    for departure in evicted {
                        debug!(
                            user_id = %departure.session.user_id,
                            conn_id = %departure.session.connection_id,
                            app = %departure.session.app_name,
                            "Session missed heartbeats"
                        );
                        listener.on_evicted(departure).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Heartbeat sweep failed");
                }
            }
        }

        debug!("Heartbeat monitor stopped");
    }
}
