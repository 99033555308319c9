//! Avail Core - Domain types for the Availability Checker
//!
//! This crate holds the vocabulary shared by the store, the server and the
//! CLI: professionals and their availability status, the immutable events
//! recorded for every status transition, and scheduled availability slots.
//!
//! # Example
//!
//! ```
//! use avail_core::{AvailabilityStatus, Profession, Professional, ProfessionalId};
//!
//! let id: ProfessionalId = "dr-grey".parse().unwrap();
//! let pro = Professional::new(id, "Meredith Grey", Profession::HealthcareProfessional);
//! assert_eq!(pro.status, AvailabilityStatus::Offline);
//! ```

mod error;
mod event;
mod professional;
mod slot;
mod status;

pub use error::ParseError;
pub use event::{AvailabilityEvent, DEFAULT_REASON};
pub use professional::{Professional, ProfessionalId};
pub use slot::{AvailabilitySlot, SlotId};
pub use status::{AvailabilityStatus, Profession};
