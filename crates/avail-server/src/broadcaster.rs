//! Notification broadcaster.
//!
//! A single loop drains the change stream and fans each event out to the
//! connections subscribed to its professional. Because there is exactly
//! one loop and each connection's outbound queue is FIFO, every
//! subscriber sees one professional's events in sequence order.

use crate::registry::ConnectionRegistry;
use crate::ServerMessage;
use avail_core::AvailabilityEvent;
use avail_store::ChangeStream;
use tracing::{debug, info, warn};

pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Runs until the change stream ends.
    pub async fn run(self, mut changes: ChangeStream) {
        info!("Broadcaster started");

        while let Some(event) = changes.next().await {
            self.dispatch(&event).await;
        }

        info!("Change stream closed, broadcaster stopping");
    }

    /// Delivers one event. Returns the number of connections it reached.
    ///
    /// A connection whose queue is gone or full is dropped from the
    /// registry; the failure never reaches the caller.
    pub async fn dispatch(&self, event: &AvailabilityEvent) -> usize {
        let recipients = self
            .registry
            .recipients(&event.professional_id, event.sequence)
            .await;

        if recipients.is_empty() {
            debug!(
                "#{} {}: no subscribers",
                event.sequence, event.professional_id
            );
            return 0;
        }

        let message = ServerMessage::AvailabilityChanged(event.clone());
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize event #{}: {}", event.sequence, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in recipients {
            match self.registry.push(connection, json.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("{}; dropping connection", e);
                    self.registry.drop_connection(connection).await;
                }
            }
        }

        debug!(
            "#{} {}: delivered to {} connection(s)",
            event.sequence, event.professional_id, delivered
        );
        delivered
    }
}
