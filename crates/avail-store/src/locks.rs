//! Striped per-professional write locks.
//!
//! Status writes for the same professional must not interleave between
//! the read of the current status and the commit. Ids hash onto a fixed
//! set of stripes; two professionals may share a stripe, which only costs
//! throughput.

use avail_core::ProfessionalId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

const STRIPES: usize = 64;

pub(crate) struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, id: &ProfessionalId) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Locks the stripe owning `id`.
    pub(crate) fn lock(&self, id: &ProfessionalId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(id)]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_same_stripe() {
        let locks = StripedLocks::new();
        let id: ProfessionalId = "p1".parse().unwrap();
        assert_eq!(locks.stripe(&id), locks.stripe(&id.clone()));
        assert!(locks.stripe(&id) < STRIPES);
    }
}
