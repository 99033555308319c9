//! Scheduled availability slots.

use crate::professional::ProfessionalId;
use crate::status::AvailabilityStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a schedule slot.
pub type SlotId = Uuid;

/// A window of time in which a professional is expected to hold a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub professional_id: ProfessionalId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AvailabilityStatus,
}

impl AvailabilitySlot {
    /// Creates a slot with a fresh id. The window is not validated here.
    pub fn new(
        professional_id: ProfessionalId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: AvailabilityStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            professional_id,
            start,
            end,
            status,
        }
    }

    /// True when `start < end`.
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// True when `at` falls inside `[start, end)`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}
