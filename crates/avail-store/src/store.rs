use crate::error::{FeedError, StoreError};
use crate::feed::{ChangeFeed, ChangeStream};
use crate::keys::{
    decode_sequence, history_key, history_sequence, professional_prefix, sequence_key,
};
use crate::locks::StripedLocks;
use avail_core::{AvailabilityEvent, AvailabilityStatus, Professional, ProfessionalId};
use chrono::Utc;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

const PROFESSIONALS: &str = "professionals";
const EVENTS: &str = "events";
const EVENTS_BY_PROFESSIONAL: &str = "events_by_professional";
const SLOTS: &str = "slots";
const APPLIED_SLOTS: &str = "applied_slots";

type TxResult = ConflictableTransactionResult<(), ()>;

/// Row counts, reported by `server.info` and `avail status`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub professionals: usize,
    pub events: usize,
    pub slots: usize,
}

/// The availability store.
///
/// Every successful `set_status` persists the new status and its event in
/// one transaction and then publishes the event on the change feed. Writes
/// for one professional are serialized; sequence assignment, commit and
/// publish happen under a single sequencer lock so feed order always
/// matches sequence order. Sequences start at 1.
pub struct AvailabilityStore {
    db: Db,
    professionals: Tree,
    events: Tree,
    by_professional: Tree,
    pub(crate) slots: Tree,
    pub(crate) applied: Tree,
    pub(crate) locks: StripedLocks,
    sequencer: Mutex<()>,
    last_sequence: AtomicU64,
    feed: ChangeFeed,
}

impl AvailabilityStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        info!("Opened availability store at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// Opens a store that lives only as long as this value.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let events = db.open_tree(EVENTS)?;
        let last_sequence = match events.last()? {
            Some((key, _)) => decode_sequence(&key).unwrap_or(0),
            None => 0,
        };

        Ok(Self {
            professionals: db.open_tree(PROFESSIONALS)?,
            events,
            by_professional: db.open_tree(EVENTS_BY_PROFESSIONAL)?,
            slots: db.open_tree(SLOTS)?,
            applied: db.open_tree(APPLIED_SLOTS)?,
            db,
            locks: StripedLocks::new(),
            sequencer: Mutex::new(()),
            last_sequence: AtomicU64::new(last_sequence),
            feed: ChangeFeed::new(),
        })
    }

    /// Takes the change stream. See [`ChangeFeed::take_stream`].
    pub fn take_changes(&self) -> Result<ChangeStream, FeedError> {
        self.feed.take_stream()
    }

    /// Sequence of the most recently committed event, 0 if none.
    ///
    /// Every event published after this call returns carries a larger
    /// sequence.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Professionals
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a new professional. Fails if the id is taken.
    pub fn register(&self, professional: Professional) -> Result<Professional, StoreError> {
        let bytes = bincode::serialize(&professional)?;
        let swapped = self.professionals.compare_and_swap(
            professional.id.as_bytes(),
            None::<&[u8]>,
            Some(bytes),
        )?;

        if swapped.is_err() {
            return Err(StoreError::AlreadyExists(professional.id));
        }

        debug!(
            "Registered {} ({}) as {}",
            professional.id, professional.profession, professional.status
        );
        Ok(professional)
    }

    /// Loads one professional.
    pub fn professional(&self, id: &ProfessionalId) -> Result<Professional, StoreError> {
        match self.professionals.get(id.as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    /// Returns true if the professional is registered.
    pub fn contains(&self, id: &ProfessionalId) -> Result<bool, StoreError> {
        Ok(self.professionals.contains_key(id.as_bytes())?)
    }

    /// Lists every professional, ordered by id.
    pub fn professionals(&self) -> Result<Vec<Professional>, StoreError> {
        self.professionals
            .iter()
            .values()
            .map(|bytes| -> Result<Professional, StoreError> {
                Ok(bincode::deserialize(&bytes?)?)
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Status transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Changes a professional's status and records the transition.
    ///
    /// Fails with `NotFound` for an unknown professional and with
    /// `InvalidTransition` when `status` is already the current status; in
    /// both cases nothing is written and no event is published.
    pub fn set_status(
        &self,
        id: &ProfessionalId,
        status: AvailabilityStatus,
        reason: &str,
    ) -> Result<AvailabilityEvent, StoreError> {
        let _write = self.locks.lock(id);

        let current = self.professional(id)?;
        if current.status == status {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                status,
            });
        }

        self.commit_transition(current, status, reason, None)
    }

    /// Persists a transition from `current` and publishes its event.
    ///
    /// The caller holds the professional's stripe lock and has checked that
    /// `status` differs from `current.status`. `mark`, when given, is
    /// written to the applied-slots tree in the same transaction.
    pub(crate) fn commit_transition(
        &self,
        current: Professional,
        status: AvailabilityStatus,
        reason: &str,
        mark: Option<&[u8]>,
    ) -> Result<AvailabilityEvent, StoreError> {
        let id = current.id.clone();
        let _sequencer = self.sequencer.lock().unwrap_or_else(|e| e.into_inner());

        let sequence = self.db.generate_id()? + 1;
        let now = Utc::now();
        let event = AvailabilityEvent {
            sequence,
            professional_id: id.clone(),
            previous_status: current.status,
            new_status: status,
            timestamp: now,
            reason: reason.to_string(),
        };

        let updated = Professional {
            status,
            changed_at: now,
            ..current
        };

        let professional_bytes = bincode::serialize(&updated)?;
        let event_bytes = bincode::serialize(&event)?;
        let event_key = sequence_key(sequence);
        let index_key = history_key(&id, sequence);

        (
            &self.professionals,
            &self.events,
            &self.by_professional,
            &self.applied,
        )
            .transaction(
                |(professionals, events, index, applied)| -> TxResult {
                    professionals.insert(id.as_bytes(), professional_bytes.as_slice())?;
                    events.insert(&event_key[..], event_bytes.as_slice())?;
                    index.insert(index_key.as_slice(), &b""[..])?;
                    if let Some(mark) = mark {
                        applied.insert(mark, &b""[..])?;
                    }
                    Ok(())
                },
            )
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Storage(e) => StoreError::Sled(e),
                TransactionError::Abort(()) => {
                    StoreError::Transaction(format!("status write for {} aborted", id))
                }
            })?;

        debug!(
            "#{} {}: {} -> {} ({})",
            sequence, id, event.previous_status, event.new_status, event.reason
        );

        self.last_sequence.store(sequence, Ordering::Release);
        self.feed.publish(event.clone());
        Ok(event)
    }

    // ─────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the `limit` most recent events of one professional, oldest
    /// first.
    pub fn history(
        &self,
        id: &ProfessionalId,
        limit: usize,
    ) -> Result<Vec<AvailabilityEvent>, StoreError> {
        if !self.contains(id)? {
            return Err(StoreError::NotFound(id.clone()));
        }

        let mut events = Vec::new();
        for entry in self
            .by_professional
            .scan_prefix(professional_prefix(id))
            .keys()
            .rev()
            .take(limit)
        {
            let key = entry?;
            let Some(sequence) = history_sequence(&key) else {
                continue;
            };
            if let Some(bytes) = self.events.get(sequence_key(sequence))? {
                events.push(bincode::deserialize(&bytes)?);
            }
        }

        events.reverse();
        Ok(events)
    }

    /// Returns the `limit` most recent events system-wide, oldest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AvailabilityEvent>, StoreError> {
        let mut events = self
            .events
            .iter()
            .values()
            .rev()
            .take(limit)
            .map(|bytes| -> Result<AvailabilityEvent, StoreError> {
                Ok(bincode::deserialize(&bytes?)?)
            })
            .collect::<Result<Vec<_>, _>>()?;
        events.reverse();
        Ok(events)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            professionals: self.professionals.len(),
            events: self.events.len(),
            slots: self.slots.len(),
        }
    }

    /// Flushes dirty pages to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
