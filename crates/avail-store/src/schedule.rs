//! Schedule slots.
//!
//! Slots are keyed by owner then slot id, so listing one professional's
//! schedule is a prefix scan. Every write checks `start < end`.
//!
//! A slot is applied at most once per activation. The applied mark lives
//! in the `applied_slots` tree under the slot's key and is written in the
//! same transaction as the status change, so it survives restarts.
//! Updating or removing a slot clears its mark.

use crate::error::StoreError;
use crate::keys::{professional_prefix, slot_key};
use crate::store::AvailabilityStore;
use avail_core::{AvailabilityEvent, AvailabilitySlot, ProfessionalId, SlotId};
use chrono::{DateTime, Utc};
use tracing::debug;

fn check_window(slot: &AvailabilitySlot) -> Result<(), StoreError> {
    if slot.is_well_formed() {
        Ok(())
    } else {
        Err(StoreError::InvalidWindow {
            start: slot.start,
            end: slot.end,
        })
    }
}

impl AvailabilityStore {
    /// Adds a slot to a professional's schedule.
    pub fn add_slot(&self, slot: AvailabilitySlot) -> Result<AvailabilitySlot, StoreError> {
        check_window(&slot)?;
        if !self.contains(&slot.professional_id)? {
            return Err(StoreError::NotFound(slot.professional_id));
        }

        let key = slot_key(&slot.professional_id, &slot.id);
        self.slots.insert(key, bincode::serialize(&slot)?)?;
        Ok(slot)
    }

    /// Replaces an existing slot. The slot must already belong to
    /// `slot.professional_id`.
    pub fn update_slot(&self, slot: AvailabilitySlot) -> Result<AvailabilitySlot, StoreError> {
        check_window(&slot)?;
        let _write = self.locks.lock(&slot.professional_id);

        let key = slot_key(&slot.professional_id, &slot.id);
        if !self.slots.contains_key(&key)? {
            return Err(StoreError::SlotNotFound(slot.id));
        }

        self.slots.insert(key.as_slice(), bincode::serialize(&slot)?)?;
        self.applied.remove(key)?;
        Ok(slot)
    }

    /// Removes a slot, returning it. A slot owned by someone else is
    /// reported as not found.
    pub fn remove_slot(
        &self,
        professional_id: &ProfessionalId,
        slot_id: &SlotId,
    ) -> Result<AvailabilitySlot, StoreError> {
        let _write = self.locks.lock(professional_id);

        let key = slot_key(professional_id, slot_id);
        match self.slots.remove(key.as_slice())? {
            Some(bytes) => {
                self.applied.remove(key)?;
                Ok(bincode::deserialize(&bytes)?)
            }
            None => Err(StoreError::SlotNotFound(*slot_id)),
        }
    }

    /// Lists one professional's slots, earliest start first.
    pub fn slots_for(
        &self,
        professional_id: &ProfessionalId,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        if !self.contains(professional_id)? {
            return Err(StoreError::NotFound(professional_id.clone()));
        }

        let mut slots = self
            .slots
            .scan_prefix(professional_prefix(professional_id))
            .values()
            .map(|bytes| -> Result<AvailabilitySlot, StoreError> {
                Ok(bincode::deserialize(&bytes?)?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        slots.sort_by_key(|s| s.start);
        Ok(slots)
    }

    /// Every slot whose window contains `at`.
    pub fn active_slots(&self, at: DateTime<Utc>) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let mut active = Vec::new();
        for bytes in self.slots.iter().values() {
            let slot: AvailabilitySlot = bincode::deserialize(&bytes?)?;
            if slot.contains(at) {
                active.push(slot);
            }
        }
        Ok(active)
    }

    /// Applies a slot's status if the slot is active at `now` and has not
    /// been applied since it was added or last updated.
    ///
    /// The slot is re-read under the owner's write lock, so a concurrent
    /// update or removal wins. Returns the event when the status changed.
    /// A slot whose status is already current is marked without an event.
    pub fn apply_slot(
        &self,
        slot: &AvailabilitySlot,
        now: DateTime<Utc>,
    ) -> Result<Option<AvailabilityEvent>, StoreError> {
        let _write = self.locks.lock(&slot.professional_id);

        let key = slot_key(&slot.professional_id, &slot.id);
        if self.applied.contains_key(&key)? {
            return Ok(None);
        }

        let slot: AvailabilitySlot = match self.slots.get(&key)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };
        if !slot.contains(now) {
            return Ok(None);
        }

        let current = self.professional(&slot.professional_id)?;
        if current.status == slot.status {
            debug!(
                "Slot {}: {} already {}",
                slot.id, slot.professional_id, slot.status
            );
            self.applied.insert(key, &b""[..])?;
            return Ok(None);
        }

        let reason = format!("schedule:{}", slot.id);
        let event = self.commit_transition(current, slot.status, &reason, Some(key.as_slice()))?;
        Ok(Some(event))
    }

    /// Clears applied marks of slots that are gone or no longer active at
    /// `now`. Returns the number of marks cleared.
    pub fn release_finished_slots(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut released = 0;
        for key in self.applied.iter().keys() {
            let key = key?;
            let active = match self.slots.get(&key)? {
                Some(bytes) => {
                    let slot: AvailabilitySlot = bincode::deserialize(&bytes)?;
                    slot.contains(now)
                }
                None => false,
            };
            if !active {
                self.applied.remove(&key)?;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::{AvailabilityStatus, Profession, Professional};
    use chrono::Duration;

    fn setup() -> (AvailabilityStore, ProfessionalId) {
        let store = AvailabilityStore::temporary().unwrap();
        let id: ProfessionalId = "medic-1".parse().unwrap();
        store
            .register(Professional::new(
                id.clone(),
                "Medic",
                Profession::EmergencyServices,
            ))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_add_and_list_sorted() {
        let (store, id) = setup();
        let now = Utc::now();

        let late = AvailabilitySlot::new(
            id.clone(),
            now + Duration::hours(4),
            now + Duration::hours(5),
            AvailabilityStatus::Busy,
        );
        let early = AvailabilitySlot::new(
            id.clone(),
            now,
            now + Duration::hours(1),
            AvailabilityStatus::Available,
        );
        store.add_slot(late.clone()).unwrap();
        store.add_slot(early.clone()).unwrap();

        let slots = store.slots_for(&id).unwrap();
        assert_eq!(slots, vec![early, late]);
        assert_eq!(store.stats().slots, 2);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let (store, id) = setup();
        let now = Utc::now();
        let slot = AvailabilitySlot::new(id, now, now, AvailabilityStatus::Available);

        assert!(matches!(
            store.add_slot(slot),
            Err(StoreError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_slot_for_unknown_professional() {
        let (store, _) = setup();
        let now = Utc::now();
        let slot = AvailabilitySlot::new(
            "nobody".parse().unwrap(),
            now,
            now + Duration::minutes(30),
            AvailabilityStatus::Available,
        );
        assert!(matches!(store.add_slot(slot), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_and_remove_check_owner() {
        let (store, id) = setup();
        let now = Utc::now();
        let slot = store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now,
                now + Duration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();

        let moved = AvailabilitySlot {
            end: now + Duration::hours(2),
            ..slot.clone()
        };
        store.update_slot(moved).unwrap();
        assert_eq!(
            store.slots_for(&id).unwrap()[0].end,
            now + Duration::hours(2)
        );

        let stranger: ProfessionalId = "stranger".parse().unwrap();
        assert!(matches!(
            store.remove_slot(&stranger, &slot.id),
            Err(StoreError::SlotNotFound(_))
        ));

        let removed = store.remove_slot(&id, &slot.id).unwrap();
        assert_eq!(removed.id, slot.id);
        assert!(store.slots_for(&id).unwrap().is_empty());
    }

    #[test]
    fn test_active_slots() {
        let (store, id) = setup();
        let now = Utc::now();
        store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - Duration::minutes(5),
                now + Duration::minutes(5),
                AvailabilityStatus::Emergency,
            ))
            .unwrap();
        store
            .add_slot(AvailabilitySlot::new(
                id,
                now + Duration::hours(1),
                now + Duration::hours(2),
                AvailabilityStatus::Busy,
            ))
            .unwrap();

        let active = store.active_slots(now).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, AvailabilityStatus::Emergency);
    }

    #[test]
    fn test_applied_mark_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id: ProfessionalId = "nurse-3".parse().unwrap();
        let now = Utc::now();

        let slot = {
            let store = AvailabilityStore::open(dir.path()).unwrap();
            store
                .register(Professional::new(
                    id.clone(),
                    "Nurse",
                    Profession::HealthcareProfessional,
                ))
                .unwrap();
            let slot = store
                .add_slot(AvailabilitySlot::new(
                    id.clone(),
                    now - Duration::minutes(1),
                    now + Duration::hours(1),
                    AvailabilityStatus::Available,
                ))
                .unwrap();

            let event = store.apply_slot(&slot, now).unwrap().unwrap();
            assert_eq!(event.reason, format!("schedule:{}", slot.id));

            store
                .set_status(&id, AvailabilityStatus::Emergency, "manual")
                .unwrap();
            store.flush().unwrap();
            slot
        };

        let store = AvailabilityStore::open(dir.path()).unwrap();
        assert!(store
            .apply_slot(&slot, now + Duration::minutes(1))
            .unwrap()
            .is_none());
        assert_eq!(
            store.professional(&id).unwrap().status,
            AvailabilityStatus::Emergency
        );
    }

    #[test]
    fn test_update_clears_applied_mark() {
        let (store, id) = setup();
        let now = Utc::now();
        let slot = store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - Duration::minutes(1),
                now + Duration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();
        store.apply_slot(&slot, now).unwrap().unwrap();
        assert!(store.apply_slot(&slot, now).unwrap().is_none());

        let changed = store
            .update_slot(AvailabilitySlot {
                status: AvailabilityStatus::Busy,
                ..slot
            })
            .unwrap();

        let event = store.apply_slot(&changed, now).unwrap().unwrap();
        assert_eq!(event.previous_status, AvailabilityStatus::Available);
        assert_eq!(event.new_status, AvailabilityStatus::Busy);
    }

    #[test]
    fn test_apply_uses_stored_slot() {
        let (store, id) = setup();
        let now = Utc::now();
        let stale = store
            .add_slot(AvailabilitySlot::new(
                id.clone(),
                now - Duration::minutes(1),
                now + Duration::hours(1),
                AvailabilityStatus::Available,
            ))
            .unwrap();
        store
            .update_slot(AvailabilitySlot {
                status: AvailabilityStatus::Emergency,
                ..stale.clone()
            })
            .unwrap();

        let event = store.apply_slot(&stale, now).unwrap().unwrap();
        assert_eq!(event.new_status, AvailabilityStatus::Emergency);

        store.remove_slot(&id, &stale.id).unwrap();
        store
            .set_status(&id, AvailabilityStatus::Offline, "manual")
            .unwrap();
        assert!(store.apply_slot(&stale, now).unwrap().is_none());
    }

    #[test]
    fn test_release_finished_slots() {
        let (store, id) = setup();
        let now = Utc::now();
        let slot = store
            .add_slot(AvailabilitySlot::new(
                id,
                now - Duration::minutes(1),
                now + Duration::minutes(10),
                AvailabilityStatus::Busy,
            ))
            .unwrap();
        store.apply_slot(&slot, now).unwrap().unwrap();

        assert_eq!(store.release_finished_slots(now).unwrap(), 0);
        assert_eq!(
            store
                .release_finished_slots(now + Duration::minutes(10))
                .unwrap(),
            1
        );
    }
}
