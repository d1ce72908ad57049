// crates/server/src/hub.rs
//! Fan-out of push events to live subscriber connections.
//!
//! The hub owns the registry of open connections. Each connection gets its
//! own unbounded channel; `broadcast` clones the event into every channel,
//! best-effort. A connection whose receiver is gone (socket closed
//! mid-broadcast) is skipped and culled without disturbing delivery to the
//! rest. Per-connection channels preserve emission order, so events of the
//! same kind for the same entity arrive in the order the single upstream
//! writer emitted them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

use chattail_core::UpdateEvent;

struct Connection {
    tx: mpsc::UnboundedSender<UpdateEvent>,
    opened_at: Instant,
    /// Diagnostic only: events handed to this connection's channel.
    events_sent: u64,
}

/// Registry of live subscriber connections.
///
/// Mutations are short and never held across an await, so a std `RwLock`
/// suffices and keeps `broadcast` synchronous.
pub struct EventHub {
    connections: RwLock<HashMap<u64, Connection>>,
    next_id: AtomicU64,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber. Returns its connection id and the receiving
    /// end the transport task forwards to the socket.
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<UpdateEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .expect("hub lock poisoned")
            .insert(
                id,
                Connection {
                    tx,
                    opened_at: Instant::now(),
                    events_sent: 0,
                },
            );
        debug!(connection_id = id, "Subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Safe to call for an id that is already gone.
    pub fn deregister(&self, id: u64) {
        let removed = self
            .connections
            .write()
            .expect("hub lock poisoned")
            .remove(&id);
        if let Some(conn) = removed {
            debug!(
                connection_id = id,
                events_sent = conn.events_sent,
                open_secs = conn.opened_at.elapsed().as_secs(),
                "Subscriber deregistered"
            );
        }
    }

    /// Deliver `event` to every currently-open connection, best-effort.
    ///
    /// Connections whose channel has closed are culled here; their transport
    /// task deregisters too, but a close racing a broadcast must not abort
    /// delivery to the remaining connections.
    pub fn broadcast(&self, event: &UpdateEvent) {
        let mut dead: Vec<u64> = Vec::new();
        {
            let mut connections = self.connections.write().expect("hub lock poisoned");
            for (id, conn) in connections.iter_mut() {
                if conn.tx.send(event.clone()).is_ok() {
                    conn.events_sent += 1;
                } else {
                    dead.push(*id);
                }
            }
            for id in &dead {
                connections.remove(id);
            }
        }
        for id in dead {
            debug!(connection_id = id, "Dropped closed connection during broadcast");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("hub lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_change(project: &str) -> UpdateEvent {
        UpdateEvent::FileChange {
            project_id: project.into(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let hub = EventHub::new();
        let (_id1, mut rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        hub.broadcast(&file_change("p1"));

        assert_eq!(rx1.recv().await.unwrap(), file_change("p1"));
        assert_eq!(rx2.recv().await.unwrap(), file_change("p1"));
    }

    #[tokio::test]
    async fn test_closed_connection_does_not_abort_broadcast() {
        let hub = EventHub::new();
        let (_id1, rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        // Simulate a socket dying without a clean deregister.
        drop(rx1);
        hub.broadcast(&file_change("p1"));

        assert_eq!(rx2.recv().await.unwrap(), file_change("p1"));
        // The dead connection was culled.
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_deregister_stops_delivery() {
        let hub = EventHub::new();
        let (id, mut rx) = hub.register();
        hub.deregister(id);
        hub.broadcast(&file_change("p1"));

        // Channel closes once the sender is dropped from the registry.
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_events_delivered_in_emission_order() {
        let hub = EventHub::new();
        let (_id, mut rx) = hub.register();

        for project in ["a", "b", "c"] {
            hub.broadcast(&file_change(project));
        }
        assert_eq!(rx.recv().await.unwrap(), file_change("a"));
        assert_eq!(rx.recv().await.unwrap(), file_change("b"));
        assert_eq!(rx.recv().await.unwrap(), file_change("c"));
    }

    #[test]
    fn test_deregister_unknown_id_is_noop() {
        let hub = EventHub::new();
        hub.deregister(999);
        assert_eq!(hub.connection_count(), 0);
    }
}
