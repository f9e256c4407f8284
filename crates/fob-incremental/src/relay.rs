//! Live-reload notification relay.
//!
//! Keeps the set of connected browser clients and fans out one message per
//! settled generation. Sending never waits: a client whose buffer is full
//! misses the message, a client whose receiver is gone is pruned.

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;

/// Messages buffered per client before it starts missing events.
const CLIENT_BUFFER: usize = 16;

/// Notification sent to clients after a generation settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReloadEvent {
    /// Output is up to date. `changed` lists the URL paths whose contents
    /// differ from the previous generation.
    BuildCompleted {
        generation: u64,
        duration_ms: u64,
        changed: Vec<String>,
        warnings: usize,
    },

    /// The build failed; the previous output is still being served.
    BuildFailed { generation: u64, errors: Vec<String> },
}

impl ReloadEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ReloadEvent::BuildCompleted { generation, .. }
            | ReloadEvent::BuildFailed { generation, .. } => *generation,
        }
    }
}

/// Connected clients keyed by id.
#[derive(Debug, Default)]
pub struct LiveReloadRelay {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_client_id: AtomicU64,
}

impl LiveReloadRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a client. Dropping the subscription unregisters it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        tracing::debug!(client = id, "live-reload client connected");

        Subscription {
            id,
            rx,
            relay: Arc::downgrade(self),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "live-reload client disconnected");
        }
    }

    /// Sends `event` to every client and returns how many accepted it.
    pub fn broadcast(&self, event: &ReloadEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("failed to encode reload event: {err}");
                return 0;
            }
        };

        let clients: Vec<(u64, mpsc::Sender<String>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = id, "live-reload client is lagging, event dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write();
            for id in closed {
                clients.remove(&id);
            }
        }

        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drops every client; their streams end. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let mut clients = self.clients.write();
        let count = clients.len();
        clients.clear();
        count
    }
}

/// A client's view of the relay: a stream of JSON-encoded [`ReloadEvent`]s.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    relay: Weak<LiveReloadRelay>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(generation: u64) -> ReloadEvent {
        ReloadEvent::BuildCompleted {
            generation,
            duration_ms: 12,
            changed: vec!["/app.js".to_string()],
            warnings: 0,
        }
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&completed(3)).unwrap();
        assert!(json.contains(r#""type":"BuildCompleted""#));
        assert!(json.contains(r#""generation":3"#));

        let failed = ReloadEvent::BuildFailed {
            generation: 4,
            errors: vec!["boom".to_string()],
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains(r#""type":"BuildFailed""#));
        assert_eq!(serde_json::from_str::<ReloadEvent>(&json).unwrap(), failed);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let relay = LiveReloadRelay::new();
        let mut a = relay.subscribe();
        let mut b = relay.subscribe();
        assert_ne!(a.id(), b.id());

        assert_eq!(relay.broadcast(&completed(1)), 2);
        assert!(a.recv().await.unwrap().contains("BuildCompleted"));
        assert!(b.recv().await.unwrap().contains("BuildCompleted"));
    }

    #[tokio::test]
    async fn test_dropped_subscription_unregisters() {
        let relay = LiveReloadRelay::new();
        let a = relay.subscribe();
        let _b = relay.subscribe();
        assert_eq!(relay.client_count(), 2);

        drop(a);
        assert_eq!(relay.client_count(), 1);
        assert_eq!(relay.broadcast(&completed(1)), 1);
    }

    #[tokio::test]
    async fn test_lagging_client_does_not_block_others() {
        let relay = LiveReloadRelay::new();
        let _slow = relay.subscribe();
        let mut fast = relay.subscribe();

        for generation in 0..CLIENT_BUFFER as u64 + 4 {
            relay.broadcast(&completed(generation));
            assert!(fast.recv().await.is_some());
        }
        // The slow client is full but still registered.
        assert_eq!(relay.client_count(), 2);
        assert_eq!(relay.broadcast(&completed(99)), 1);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let relay = LiveReloadRelay::new();
        let mut sub = relay.subscribe();
        assert_eq!(relay.close(), 1);
        assert!(sub.recv().await.is_none());
        assert_eq!(relay.broadcast(&completed(1)), 0);
    }
}
