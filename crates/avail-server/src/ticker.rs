//! Schedule ticker.
//!
//! Periodically applies the status of every active slot that has not been
//! applied yet. Applied marks are kept by the store, so a restarted ticker
//! leaves a manual change made during a running slot alone, and an updated
//! slot is applied again.

use avail_core::AvailabilityEvent;
use avail_store::{AvailabilityStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ScheduleTicker {
    store: Arc<AvailabilityStore>,
    interval: Duration,
}

impl ScheduleTicker {
    pub fn new(store: Arc<AvailabilityStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Ticks forever. Each tick runs on the blocking pool.
    pub async fn run(self) {
        info!("Schedule ticker running every {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let ticker = self.clone();
            match tokio::task::spawn_blocking(move || ticker.tick(Utc::now())).await {
                Ok(Ok(events)) if !events.is_empty() => {
                    debug!("Schedule tick applied {} slot(s)", events.len());
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Schedule tick failed: {}", e),
                Err(e) => warn!("Schedule tick panicked: {}", e),
            }
        }
    }

    /// Applies every active, not yet applied slot and releases the marks
    /// of slots that have ended. Blocks on the store.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<AvailabilityEvent>, StoreError> {
        let mut events = Vec::new();
        for slot in self.store.active_slots(now)? {
            match self.store.apply_slot(&slot, now) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(StoreError::NotFound(id)) => {
                    warn!("Slot {} belongs to unknown professional {}", slot.id, id);
                }
                Err(e) => return Err(e),
            }
        }

        let released = self.store.release_finished_slots(now)?;
        if released > 0 {
            debug!("Released {} finished slot(s)", released);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::{
        AvailabilitySlot, AvailabilityStatus, Profession, Professional, ProfessionalId,
    };
    use chrono::Duration as ChronoDuration;

    fn store_with(id: &str, profession: Profession) -> (Arc<AvailabilityStore>, ProfessionalId) {
        let store = Arc::new(AvailabilityStore::temporary().unwrap());
        let id: ProfessionalId = id.parse().unwrap();
        store
            .register(Professional::new(id.clone(), "Jen Barber", profession))
            .unwrap();
        (store, id)
    }

    fn ticker(store: &Arc<AvailabilityStore>) -> ScheduleTicker {
        ScheduleTicker::new(store.clone(), Duration::from_secs(1))
    }

    #[test]
    fn test_slot_applied_once() {
        let (store, id) = store_with("support-1", Profession::CustomerService);

        let now = Utc::now();
        let slot = store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();

        let ticker = ticker(&store);

        let events = ticker.tick(now).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].new_status, AvailabilityStatus::Available);
        assert_eq!(events[0].reason, format!("schedule:{}", slot.id));

        // A manual override during the slot is not reverted.
        store.set_status(&id, AvailabilityStatus::Busy, "manual").unwrap();
        assert!(ticker.tick(now + ChronoDuration::minutes(1)).unwrap().is_empty());
        assert_eq!(
            store.professional(&id).unwrap().status,
            AvailabilityStatus::Busy
        );
    }

    #[test]
    fn test_new_ticker_keeps_manual_override() {
        let (store, id) = store_with("support-2", Profession::ItSupport);

        let now = Utc::now();
        store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();

        assert_eq!(ticker(&store).tick(now).unwrap().len(), 1);
        store.set_status(&id, AvailabilityStatus::Busy, "manual").unwrap();

        // A ticker started after a restart sees the same applied marks.
        let restarted = ticker(&store);
        assert!(restarted
            .tick(now + ChronoDuration::minutes(1))
            .unwrap()
            .is_empty());
        assert_eq!(
            store.professional(&id).unwrap().status,
            AvailabilityStatus::Busy
        );
    }

    #[test]
    fn test_updated_active_slot_is_reapplied() {
        let (store, id) = store_with("medic-2", Profession::EmergencyServices);

        let now = Utc::now();
        let slot = store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();

        let ticker = ticker(&store);
        assert_eq!(ticker.tick(now).unwrap().len(), 1);

        store
            .update_slot(AvailabilitySlot {
                status: AvailabilityStatus::Emergency,
                ..slot
            })
            .unwrap();

        let events = ticker.tick(now + ChronoDuration::minutes(1)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_status, AvailabilityStatus::Available);
        assert_eq!(events[0].new_status, AvailabilityStatus::Emergency);
    }

    #[test]
    fn test_redundant_slot_status_is_ignored() {
        let (store, id) = store_with("p1", Profession::ItSupport);

        let now = Utc::now();
        store
            .add_slot(AvailabilitySlot::new(
                id,
                now,
                now + ChronoDuration::hours(1),
                AvailabilityStatus::Offline,
            ))
            .unwrap();

        assert!(ticker(&store).tick(now).unwrap().is_empty());
        assert_eq!(store.last_sequence(), 0);
    }

    #[tokio::test]
    async fn test_run_applies_on_blocking_pool() {
        let (store, id) = store_with("support-3", Profession::CustomerService);
        let now = Utc::now();
        store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - ChronoDuration::minutes(1),
                now + ChronoDuration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();

        let ticker = ScheduleTicker::new(store.clone(), Duration::from_millis(10));
        let handle = tokio::spawn(ticker.run());
        for _ in 0..100 {
            if store.professional(&id).unwrap().status == AvailabilityStatus::Available {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(
            store.professional(&id).unwrap().status,
            AvailabilityStatus::Available
        );
    }
}
