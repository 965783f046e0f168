//! Registry of live push connections and the shared visitor counter.
//!
//! Every connection owns a bounded outbound queue; the registry keeps the
//! sending halves. Membership changes and fan-out happen under one lock, so
//! the counter always equals the number of registered connections and each
//! connection receives counts in the order they were produced.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Identifier of a push connection, unique for the registry's lifetime.
pub type ConnectionId = u64;

/// Messages pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// `{"type": "visitor_count", "count": N}`
    VisitorCount { count: usize },
}

/// What a connection task gets back from [`ConnectionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    /// Messages to forward to the client. Yields `None` once the registry
    /// dropped the connection (failed delivery or shutdown).
    pub receiver: mpsc::Receiver<PushMessage>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, mpsc::Sender<PushMessage>>,
    visitor_count: usize,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ConnectionRegistry {
    /// `queue_capacity` bounds the messages waiting for a slow client; a
    /// client that lets its queue fill up is considered dead.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Adds a connection, increments the visitor count, then broadcasts the
    /// new count to every registered connection including the new one.
    pub async fn register(&self) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.queue_capacity);

        let mut inner = self.inner.lock().await;
        inner.connections.insert(id, tx);
        inner.visitor_count += 1;
        info!(connection = id, count = inner.visitor_count, "Visitor connected");
        Self::broadcast_locked(&mut inner);

        Registration { id, receiver }
    }

    /// Removes a connection, decrements the count and broadcasts it to the
    /// remaining connections.
    ///
    /// Returns `false` when the connection was already gone (dropped after a
    /// failed delivery, or during shutdown); nothing is broadcast then.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.connections.remove(&id).is_none() {
            return false;
        }
        inner.visitor_count -= 1;
        info!(connection = id, count = inner.visitor_count, "Visitor disconnected");
        Self::broadcast_locked(&mut inner);
        true
    }

    /// Sends the current count to every registered connection.
    pub async fn broadcast_visitor_count(&self) {
        let mut inner = self.inner.lock().await;
        Self::broadcast_locked(&mut inner);
    }

    pub async fn visitor_count(&self) -> usize {
        self.inner.lock().await.visitor_count
    }

    /// Drops every connection; their receivers then yield `None`.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let closed = inner.connections.len();
        inner.connections.clear();
        inner.visitor_count = 0;
        if closed > 0 {
            info!(closed, "All push connections closed");
        }
        closed
    }

    /// Fan-out under the lock. Connections whose queue is full or closed are
    /// removed, and the corrected count is sent again to the survivors.
    fn broadcast_locked(inner: &mut RegistryInner) {
        loop {
            let message = PushMessage::VisitorCount {
                count: inner.visitor_count,
            };

            let dead: Vec<ConnectionId> = inner
                .connections
                .iter()
                .filter_map(|(id, tx)| match tx.try_send(message.clone()) {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(connection = *id, "Dropping push connection: {}", err);
                        Some(*id)
                    }
                })
                .collect();

            if dead.is_empty() {
                debug!(count = inner.visitor_count, "Visitor count broadcast");
                return;
            }

            for id in dead {
                inner.connections.remove(&id);
                inner.visitor_count -= 1;
            }
        }
    }
}
