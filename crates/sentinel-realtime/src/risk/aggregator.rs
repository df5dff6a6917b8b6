//! Latest-score-per-user map, bounded activity feed and live updates.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use sentinel_core::result::AppResult;
use sentinel_core::types::UserId;

use super::event::{RiskClass, RiskEvent, RiskStatus, classify};

/// Latest known risk for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshotEntry {
    /// Score of the latest event.
    pub score: f64,
    /// Status of the latest event.
    pub status: RiskStatus,
    /// Application of the latest event.
    pub last_app: String,
    /// When the latest event was produced.
    pub updated_at: DateTime<Utc>,
}

/// Ingests risk events for the operator view.
///
/// Writes to the snapshot map and the activity feed happen under one lock,
/// so the newest activity entry always agrees with the snapshot. Readers of
/// the snapshot do not take that lock and may briefly lag.
#[derive(Debug)]
pub struct RiskAggregator {
    latest: DashMap<UserId, RiskSnapshotEntry>,
    activity: Mutex<VecDeque<RiskEvent>>,
    capacity: usize,
    updates: broadcast::Sender<RiskEvent>,
}

impl RiskAggregator {
    /// Creates an aggregator keeping at most `capacity` activity entries.
    pub fn new(capacity: usize, subscriber_buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(subscriber_buffer.max(1));
        Self {
            latest: DashMap::new(),
            activity: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            updates,
        }
    }

    /// Record an event and notify subscribers. Returns the advisory class.
    pub fn ingest(&self, event: RiskEvent) -> AppResult<RiskClass> {
        event.validate()?;
        let class = classify(event.score);

        {
            let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
            self.latest.insert(
                event.user_id.clone(),
                RiskSnapshotEntry {
                    score: event.score,
                    status: event.status,
                    last_app: event.app_name.clone(),
                    updated_at: event.timestamp,
                },
            );
            while activity.len() >= self.capacity {
                activity.pop_front();
            }
            activity.push_back(event.clone());
        }

        debug!(
            user_id = %event.user_id,
            score = event.score,
            status = %event.status,
            class = ?class,
            "Risk event ingested"
        );

        // No receivers is fine.
        let _ = self.updates.send(event);
        Ok(class)
    }

    /// Latest entry for every user seen so far.
    pub fn current_snapshot(&self) -> BTreeMap<UserId, RiskSnapshotEntry> {
        self.latest
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Latest entry for one user.
    pub fn snapshot_of(&self, user_id: &UserId) -> Option<RiskSnapshotEntry> {
        self.latest.get(user_id).map(|entry| entry.value().clone())
    }

    /// Activity feed, newest first.
    pub fn activity(&self) -> Vec<RiskEvent> {
        let activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        activity.iter().rev().cloned().collect()
    }

    /// Receive every event ingested from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RiskEvent> {
        self.updates.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user: &str, score: f64, status: RiskStatus) -> RiskEvent {
        RiskEvent {
            user_id: UserId::from(user),
            app_name: "HR Portal".into(),
            score,
            status,
            reasons: vec!["test".into()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_ingest_updates_snapshot_and_activity() {
        let aggregator = RiskAggregator::new(50, 16);
        let class = aggregator
            .ingest(event("u1", 85.0, RiskStatus::Killed))
            .expect("ingest");

        assert_eq!(class, RiskClass::KillEligible);
        let snapshot = aggregator.current_snapshot();
        assert_eq!(snapshot[&UserId::from("u1")].status, RiskStatus::Killed);
        let newest = &aggregator.activity()[0];
        assert_eq!(newest.user_id.as_str(), "u1");
        assert_eq!(newest.score, 85.0);
    }

    #[test]
    fn test_activity_is_capped_oldest_first_out() {
        let aggregator = RiskAggregator::new(50, 16);
        for i in 0..60 {
            aggregator
                .ingest(event(&format!("u{i}"), 10.0, RiskStatus::Ok))
                .expect("ingest");
        }
        let activity = aggregator.activity();
        assert_eq!(activity.len(), 50);
        assert_eq!(activity[0].user_id.as_str(), "u59");
        assert_eq!(activity[49].user_id.as_str(), "u10");
    }

    #[test]
    fn test_status_only_changes_with_new_event() {
        let aggregator = RiskAggregator::new(50, 16);
        let u1 = UserId::from("u1");
        aggregator
            .ingest(event("u1", 90.0, RiskStatus::Warn))
            .expect("ingest");
        assert_eq!(
            aggregator.snapshot_of(&u1).map(|s| s.status),
            Some(RiskStatus::Warn)
        );
        aggregator
            .ingest(event("u1", 5.0, RiskStatus::Ok))
            .expect("ingest");
        assert_eq!(
            aggregator.snapshot_of(&u1).map(|s| s.status),
            Some(RiskStatus::Ok)
        );
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_updates() {
        let aggregator = RiskAggregator::new(50, 16);
        let mut a = aggregator.subscribe();
        let mut b = aggregator.subscribe();
        aggregator
            .ingest(event("u1", 60.0, RiskStatus::Warn))
            .expect("ingest");
        assert_eq!(a.recv().await.expect("a").user_id.as_str(), "u1");
        assert_eq!(b.recv().await.expect("b").user_id.as_str(), "u1");
    }

    #[test]
    fn test_invalid_event_rejected() {
        let aggregator = RiskAggregator::new(50, 16);
        assert!(aggregator.ingest(event("u1", f64::NAN, RiskStatus::Ok)).is_err());
        assert!(aggregator.current_snapshot().is_empty());
    }
}
