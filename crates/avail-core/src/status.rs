//! Availability status and profession categories.
//!
//! Both enums serialize as snake_case strings on the wire and parse
//! case-insensitively from user input (CLI arguments, roster files).

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current availability of a professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// Ready to take work.
    Available,

    /// On duty but occupied.
    Busy,

    /// Off shift or unreachable.
    Offline,

    /// Reserved for emergencies only.
    Emergency,
}

impl AvailabilityStatus {
    /// Every status, in declaration order.
    pub const ALL: [AvailabilityStatus; 4] = [
        Self::Available,
        Self::Busy,
        Self::Offline,
        Self::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Emergency => "emergency",
        }
    }
}

impl Default for AvailabilityStatus {
    fn default() -> Self {
        Self::Offline
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AvailabilityStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| ParseError::UnknownStatus(s.to_string()))
    }
}

/// Profession category of a professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profession {
    HealthcareProfessional,
    EmergencyServices,
    ItSupport,
    CustomerService,
}

impl Profession {
    pub const ALL: [Profession; 4] = [
        Self::HealthcareProfessional,
        Self::EmergencyServices,
        Self::ItSupport,
        Self::CustomerService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthcareProfessional => "healthcare_professional",
            Self::EmergencyServices => "emergency_services",
            Self::ItSupport => "it_support",
            Self::CustomerService => "customer_service",
        }
    }
}

impl fmt::Display for Profession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Profession {
    type Err = ParseError;

    /// Accepts the snake_case name as well as the dashed form
    /// (`it-support`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownProfession(s.to_string()))
    }
}
