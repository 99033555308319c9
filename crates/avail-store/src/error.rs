use avail_core::{AvailabilityStatus, ProfessionalId, SlotId};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Professional not found: {0}")]
    NotFound(ProfessionalId),

    #[error("Professional already exists: {0}")]
    AlreadyExists(ProfessionalId),

    #[error("Professional {id} is already {status}")]
    InvalidTransition {
        id: ProfessionalId,
        status: AvailabilityStatus,
    },

    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    #[error("Invalid slot window: {start} is not before {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Change stream has already been taken")]
    AlreadyTaken,
}
