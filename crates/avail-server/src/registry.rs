//! Connection registry.
//!
//! Tracks live WebSocket connections, their outbound queues, and which
//! professionals each connection is subscribed to. Both directions of the
//! relation are kept under one lock so they can never disagree.
//!
//! Outbound queues are bounded. A connection whose queue is full is
//! treated as lost, so one stalled client cannot grow server memory.

use avail_core::ProfessionalId;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError, Receiver, Sender},
    RwLock,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Messages a connection may have queued before it counts as lost.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection lost: {0}")]
    ConnectionLost(ConnectionId),
}

struct Connection {
    sender: Sender<String>,
    topics: HashSet<ProfessionalId>,
}

/// Subscriber entry: events with a sequence at or below `after` predate
/// the subscription and are not delivered.
type Watermarks = HashMap<ConnectionId, u64>;

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    subscribers: HashMap<ProfessionalId, Watermarks>,
}

/// Shared registry of connections and subscriptions.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose outbound queues hold at most `capacity`
    /// messages (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new connection.
    ///
    /// Returns the connection id and the receiving end of its outbound
    /// queue. Dropping the receiver, or letting the queue fill up, makes
    /// pushes fail with `ConnectionLost`.
    pub async fn connect(&self) -> (ConnectionId, Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            Connection {
                sender: tx,
                topics: HashSet::new(),
            },
        );

        debug!(
            "Registered {}, total connections: {}",
            id,
            guard.connections.len()
        );
        (id, rx)
    }

    /// Subscribes a connection to a professional.
    ///
    /// Returns false if the subscription already existed.
    pub async fn subscribe(
        &self,
        connection: ConnectionId,
        professional: &ProfessionalId,
    ) -> Result<bool, RegistryError> {
        self.subscribe_after(connection, professional, 0).await
    }

    /// Subscribes a connection, ignoring events with sequence `<= after`.
    ///
    /// Re-subscribing keeps the original watermark.
    pub async fn subscribe_after(
        &self,
        connection: ConnectionId,
        professional: &ProfessionalId,
        after: u64,
    ) -> Result<bool, RegistryError> {
        let mut guard = self.inner.write().await;
        let Inner {
            connections,
            subscribers,
        } = &mut *guard;

        let entry = connections
            .get_mut(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;

        if !entry.topics.insert(professional.clone()) {
            return Ok(false);
        }

        subscribers
            .entry(professional.clone())
            .or_default()
            .insert(connection, after);

        debug!("{} subscribed to {}", connection, professional);
        Ok(true)
    }

    /// Removes one subscription. Returns false if it did not exist.
    pub async fn unsubscribe(
        &self,
        connection: ConnectionId,
        professional: &ProfessionalId,
    ) -> Result<bool, RegistryError> {
        let mut guard = self.inner.write().await;
        let Inner {
            connections,
            subscribers,
        } = &mut *guard;

        let entry = connections
            .get_mut(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;

        if !entry.topics.remove(professional) {
            return Ok(false);
        }

        remove_watermark(subscribers, professional, connection);
        debug!("{} unsubscribed from {}", connection, professional);
        Ok(true)
    }

    /// Forgets a connection and every subscription it holds.
    ///
    /// Returns the number of subscriptions removed. Dropping an unknown
    /// connection is a no-op.
    pub async fn drop_connection(&self, connection: ConnectionId) -> usize {
        let mut guard = self.inner.write().await;
        let Inner {
            connections,
            subscribers,
        } = &mut *guard;

        let Some(entry) = connections.remove(&connection) else {
            return 0;
        };

        for professional in &entry.topics {
            remove_watermark(subscribers, professional, connection);
        }

        debug!(
            "Dropped {} ({} subscriptions), remaining connections: {}",
            connection,
            entry.topics.len(),
            connections.len()
        );
        entry.topics.len()
    }

    /// Every connection subscribed to `professional`.
    pub async fn subscribers_of(&self, professional: &ProfessionalId) -> HashSet<ConnectionId> {
        let guard = self.inner.read().await;
        guard
            .subscribers
            .get(professional)
            .map(|w| w.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Connections that should receive event `sequence` for `professional`.
    pub async fn recipients(
        &self,
        professional: &ProfessionalId,
        sequence: u64,
    ) -> Vec<ConnectionId> {
        let guard = self.inner.read().await;
        guard
            .subscribers
            .get(professional)
            .map(|w| {
                w.iter()
                    .filter(|(_, after)| sequence > **after)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Professionals a connection is subscribed to.
    pub async fn subscriptions_of(&self, connection: ConnectionId) -> HashSet<ProfessionalId> {
        let guard = self.inner.read().await;
        guard
            .connections
            .get(&connection)
            .map(|c| c.topics.clone())
            .unwrap_or_default()
    }

    /// Queues a message on a connection's outbound channel without
    /// waiting. A full queue means the client stopped reading.
    pub async fn push(
        &self,
        connection: ConnectionId,
        message: String,
    ) -> Result<(), RegistryError> {
        let guard = self.inner.read().await;
        let entry = guard
            .connections
            .get(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;

        match entry.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    "{} outbound queue full ({} messages)",
                    connection, self.capacity
                );
                Err(RegistryError::ConnectionLost(connection))
            }
            Err(TrySendError::Closed(_)) => Err(RegistryError::ConnectionLost(connection)),
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn subscription_count(&self) -> usize {
        let guard = self.inner.read().await;
        guard.subscribers.values().map(|w| w.len()).sum()
    }
}

fn remove_watermark(
    subscribers: &mut HashMap<ProfessionalId, Watermarks>,
    professional: &ProfessionalId,
    connection: ConnectionId,
) {
    if let Some(watermarks) = subscribers.get_mut(professional) {
        watermarks.remove(&connection);
        if watermarks.is_empty() {
            subscribers.remove(professional);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProfessionalId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = registry.connect().await;
        let (b, _rx_b) = registry.connect().await;

        assert!(registry.subscribe(a, &pid("p1")).await.unwrap());
        assert!(!registry.subscribe(a, &pid("p1")).await.unwrap());
        assert!(registry.subscribe(b, &pid("p1")).await.unwrap());

        assert_eq!(
            registry.subscribers_of(&pid("p1")).await,
            HashSet::from([a, b])
        );

        assert!(registry.unsubscribe(a, &pid("p1")).await.unwrap());
        assert!(!registry.unsubscribe(a, &pid("p1")).await.unwrap());
        assert_eq!(registry.subscribers_of(&pid("p1")).await, HashSet::from([b]));
        assert_eq!(registry.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let ghost = ConnectionId::new();
        assert_eq!(
            registry.subscribe(ghost, &pid("p1")).await,
            Err(RegistryError::UnknownConnection(ghost))
        );
        assert_eq!(registry.drop_connection(ghost).await, 0);
    }

    #[tokio::test]
    async fn test_drop_connection_removes_everything() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = registry.connect().await;
        registry.subscribe(a, &pid("p1")).await.unwrap();
        registry.subscribe(a, &pid("p2")).await.unwrap();

        assert_eq!(registry.drop_connection(a).await, 2);
        assert!(registry.subscribers_of(&pid("p1")).await.is_empty());
        assert!(registry.subscribers_of(&pid("p2")).await.is_empty());
        assert!(registry.subscriptions_of(a).await.is_empty());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribers_match_active_subscriptions() {
        let registry = ConnectionRegistry::new();
        let mut conns = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (id, rx) = registry.connect().await;
            conns.push(id);
            receivers.push(rx);
        }

        // Model: the set of (connection index, professional) pairs.
        let mut model: HashSet<(usize, &str)> = HashSet::new();
        let ops: [(u8, usize, &str); 12] = [
            (0, 0, "p1"),
            (0, 1, "p1"),
            (0, 2, "p2"),
            (1, 0, "p1"),
            (0, 3, "p1"),
            (2, 1, ""),
            (0, 0, "p2"),
            (1, 2, "p3"),
            (0, 2, "p1"),
            (1, 3, "p1"),
            (2, 0, ""),
            (0, 3, "p2"),
        ];

        for (op, conn, p) in ops {
            match op {
                0 => {
                    registry.subscribe(conns[conn], &pid(p)).await.unwrap();
                    model.insert((conn, p));
                }
                1 => {
                    registry.unsubscribe(conns[conn], &pid(p)).await.unwrap();
                    model.remove(&(conn, p));
                }
                _ => {
                    registry.drop_connection(conns[conn]).await;
                    model.retain(|(c, _)| *c != conn);
                }
            }

            for professional in ["p1", "p2", "p3"] {
                let expected: HashSet<ConnectionId> = model
                    .iter()
                    .filter(|(_, p)| *p == professional)
                    .map(|(c, _)| conns[*c])
                    .collect();
                assert_eq!(registry.subscribers_of(&pid(professional)).await, expected);
            }
        }
    }

    #[tokio::test]
    async fn test_push_to_dropped_receiver() {
        let registry = ConnectionRegistry::new();
        let (a, rx) = registry.connect().await;
        drop(rx);

        assert_eq!(
            registry.push(a, "hello".into()).await,
            Err(RegistryError::ConnectionLost(a))
        );
    }

    #[tokio::test]
    async fn test_full_queue_counts_as_lost() {
        let registry = ConnectionRegistry::with_capacity(2);
        let (a, mut rx) = registry.connect().await;

        registry.push(a, "one".into()).await.unwrap();
        registry.push(a, "two".into()).await.unwrap();
        assert_eq!(
            registry.push(a, "three".into()).await,
            Err(RegistryError::ConnectionLost(a))
        );

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        registry.push(a, "four".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_recipients_respect_watermark() {
        let registry = ConnectionRegistry::new();
        let (early, _rx1) = registry.connect().await;
        let (late, _rx2) = registry.connect().await;

        registry.subscribe_after(early, &pid("p1"), 0).await.unwrap();
        registry.subscribe_after(late, &pid("p1"), 5).await.unwrap();

        assert_eq!(registry.recipients(&pid("p1"), 5).await, vec![early]);
        let mut both = registry.recipients(&pid("p1"), 6).await;
        both.sort();
        let mut expected = vec![early, late];
        expected.sort();
        assert_eq!(both, expected);
    }
}
