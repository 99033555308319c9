//! Availability events.

use crate::professional::ProfessionalId;
use crate::status::AvailabilityStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason recorded when a caller gives none.
pub const DEFAULT_REASON: &str = "manual";

/// Immutable record of one status transition.
///
/// Sequences are assigned by the store, strictly increasing across the
/// whole system. For a single professional, consecutive events chain:
/// each event's `previous_status` is the prior event's `new_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityEvent {
    /// System-wide creation order.
    pub sequence: u64,
    pub professional_id: ProfessionalId,
    pub previous_status: AvailabilityStatus,
    pub new_status: AvailabilityStatus,
    pub timestamp: DateTime<Utc>,
    /// What triggered the transition (e.g. "shift-start").
    pub reason: String,
}

impl AvailabilityEvent {
    /// Returns true if `next` directly follows this event for the same
    /// professional.
    pub fn chains_to(&self, next: &AvailabilityEvent) -> bool {
        self.professional_id == next.professional_id
            && self.new_status == next.previous_status
            && self.sequence < next.sequence
    }
}
