//! Change feed - the stream of committed availability events.
//!
//! The store publishes every committed event here, in sequence order. The
//! feed buffers without bound until its single consumer takes the stream,
//! so an event is never lost for lack of a listener. Once taken, the
//! stream cannot be taken again.

use crate::error::FeedError;
use avail_core::AvailabilityEvent;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

pub struct ChangeFeed {
    tx: mpsc::UnboundedSender<AvailabilityEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<AvailabilityEvent>>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Hands an event to the stream.
    ///
    /// Fails silently when the consumer has gone away; delivery is best
    /// effort once the event is committed.
    pub fn publish(&self, event: AvailabilityEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(
                "Change stream closed, event {} not forwarded",
                e.0.sequence
            );
        }
    }

    /// Takes the stream. Only the first call succeeds.
    pub fn take_stream(&self) -> Result<ChangeStream, FeedError> {
        let mut slot = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
            .map(|rx| ChangeStream { rx })
            .ok_or(FeedError::AlreadyTaken)
    }
}

/// Consumer side of the change feed.
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<AvailabilityEvent>,
}

impl ChangeStream {
    /// Waits for the next event. Returns `None` once the store is dropped
    /// and every buffered event has been drained.
    pub async fn next(&mut self) -> Option<AvailabilityEvent> {
        self.rx.recv().await
    }

    /// Returns the next buffered event without waiting.
    pub fn try_next(&mut self) -> Option<AvailabilityEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::AvailabilityStatus;
    use chrono::Utc;

    fn event(sequence: u64) -> AvailabilityEvent {
        AvailabilityEvent {
            sequence,
            professional_id: "p1".parse().unwrap(),
            previous_status: AvailabilityStatus::Offline,
            new_status: AvailabilityStatus::Available,
            timestamp: Utc::now(),
            reason: "test".into(),
        }
    }

    #[test]
    fn test_stream_taken_once() {
        let feed = ChangeFeed::new();
        assert!(feed.take_stream().is_ok());
        assert_eq!(feed.take_stream().err(), Some(FeedError::AlreadyTaken));
    }

    #[test]
    fn test_events_buffered_before_take() {
        let feed = ChangeFeed::new();
        feed.publish(event(1));
        feed.publish(event(2));

        let mut stream = feed.take_stream().unwrap();
        assert_eq!(stream.try_next().map(|e| e.sequence), Some(1));
        assert_eq!(stream.try_next().map(|e| e.sequence), Some(2));
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_publish_after_consumer_dropped() {
        let feed = ChangeFeed::new();
        drop(feed.take_stream().unwrap());
        feed.publish(event(1));
    }

    #[tokio::test]
    async fn test_stream_ends_when_feed_dropped() {
        let feed = ChangeFeed::new();
        let mut stream = feed.take_stream().unwrap();
        feed.publish(event(5));
        drop(feed);

        assert_eq!(stream.next().await.map(|e| e.sequence), Some(5));
        assert!(stream.next().await.is_none());
    }
}
