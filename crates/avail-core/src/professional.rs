//! Professionals and their identities.

use crate::error::ParseError;
use crate::status::{AvailabilityStatus, Profession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest identifier accepted.
const MAX_ID_LEN: usize = 128;

/// Stable identity of a professional.
///
/// Identifiers are non-empty, at most 128 bytes, have no leading or
/// trailing whitespace and never contain a NUL byte; the store uses NUL as
/// the separator in composite keys. `FromStr` and deserialization apply
/// the same check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfessionalId(String);

impl ProfessionalId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for ProfessionalId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty()
            || value.len() > MAX_ID_LEN
            || value.contains('\0')
            || value.trim() != value
        {
            return Err(ParseError::InvalidId(value));
        }
        Ok(Self(value))
    }
}

impl From<ProfessionalId> for String {
    fn from(id: ProfessionalId) -> Self {
        id.0
    }
}

impl FromStr for ProfessionalId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for ProfessionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A professional whose availability is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professional {
    /// Stable identity.
    pub id: ProfessionalId,

    /// Display name.
    pub name: String,

    /// Profession category.
    pub profession: Profession,

    /// Current availability status.
    pub status: AvailabilityStatus,

    /// When the status last changed (or when the professional was registered).
    pub changed_at: DateTime<Utc>,
}

impl Professional {
    /// Creates a professional that starts out offline.
    pub fn new(id: ProfessionalId, name: impl Into<String>, profession: Profession) -> Self {
        Self {
            id,
            name: name.into(),
            profession,
            status: AvailabilityStatus::default(),
            changed_at: Utc::now(),
        }
    }

    /// Sets the initial status.
    pub fn with_status(mut self, status: AvailabilityStatus) -> Self {
        self.status = status;
        self
    }
}
