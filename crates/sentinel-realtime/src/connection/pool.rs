//! Connection pool: every attached transport, indexed by connection id.
//!
//! The pool knows nothing about users; which user a connection joined as is
//! the session registry's business.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use sentinel_core::types::ConnectionId;

use super::handle::ConnectionHandle;
use crate::message::types::OutboundMessage;

/// Thread-safe pool of attached connections.
#[derive(Debug)]
pub struct ConnectionPool {
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    buffer_size: usize,
}

impl ConnectionPool {
    /// Creates an empty pool whose connections buffer `buffer_size` messages.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            by_id: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Attach a new connection.
    ///
    /// Returns the handle and the receiver the transport task drains.
    pub fn register(
        &self,
        remote: Option<String>,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let handle = Arc::new(ConnectionHandle::new(tx, remote));
        self.by_id.insert(handle.id, Arc::clone(&handle));
        (handle, rx)
    }

    /// Detach a connection.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.remove(conn_id).map(|(_, handle)| handle)
    }

    /// Look up a connection.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of attached connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Ask every connection to hang up and empty the pool.
    pub fn close_all(&self) -> usize {
        let handles: Vec<Arc<ConnectionHandle>> = self
            .by_id
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handle in &handles {
            handle.close();
        }
        self.by_id.clear();
        handles.len()
    }
}
