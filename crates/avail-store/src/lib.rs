//! Avail Store - Persistent availability state
//!
//! This crate owns everything that is written to disk: professionals, the
//! append-only log of availability events and the schedule. It also owns
//! the change feed, the in-process stream that carries every committed
//! event to the broadcaster.
//!
//! # Layout
//!
//! The store is a sled database with one tree per table:
//! - `professionals`: id -> professional
//! - `events`: big-endian sequence -> event
//! - `events_by_professional`: id, NUL, big-endian sequence -> ()
//! - `slots`: id, NUL, slot uuid -> slot
//! - `applied_slots`: slot key -> () for slots whose status was applied
//!
//! Values are bincode-encoded.
//!
//! # Example
//!
//! ```no_run
//! use avail_core::AvailabilityStatus;
//! use avail_store::AvailabilityStore;
//!
//! let store = AvailabilityStore::open(".avail/data").unwrap();
//! let id = "dr-grey".parse().unwrap();
//! let event = store.set_status(&id, AvailabilityStatus::Available, "shift-start").unwrap();
//! println!("{} -> {}", event.previous_status, event.new_status);
//! ```

mod error;
mod feed;
mod keys;
mod locks;
mod schedule;
mod store;

pub use error::{FeedError, StoreError};
pub use feed::{ChangeFeed, ChangeStream};
pub use store::{AvailabilityStore, StoreStats};
