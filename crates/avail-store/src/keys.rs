//! Composite key encoding for the sled trees.
//!
//! Ids never contain NUL, so `id ++ 0x00` is an unambiguous prefix.

use avail_core::{ProfessionalId, SlotId};

const SEPARATOR: u8 = 0;

pub(crate) fn sequence_key(sequence: u64) -> [u8; 8] {
    sequence.to_be_bytes()
}

pub(crate) fn decode_sequence(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

/// Prefix shared by every key belonging to one professional.
pub(crate) fn professional_prefix(id: &ProfessionalId) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.as_bytes().len() + 1);
    key.extend_from_slice(id.as_bytes());
    key.push(SEPARATOR);
    key
}

pub(crate) fn history_key(id: &ProfessionalId, sequence: u64) -> Vec<u8> {
    let mut key = professional_prefix(id);
    key.extend_from_slice(&sequence_key(sequence));
    key
}

/// Extracts the sequence from a history key.
pub(crate) fn history_sequence(key: &[u8]) -> Option<u64> {
    if key.len() < 8 {
        return None;
    }
    decode_sequence(&key[key.len() - 8..])
}

pub(crate) fn slot_key(id: &ProfessionalId, slot: &SlotId) -> Vec<u8> {
    let mut key = professional_prefix(id);
    key.extend_from_slice(slot.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keys_sort_by_sequence() {
        let id: ProfessionalId = "p1".parse().unwrap();
        let a = history_key(&id, 9);
        let b = history_key(&id, 256);
        assert!(a < b);
        assert_eq!(history_sequence(&b), Some(256));
    }

    #[test]
    fn test_prefix_does_not_collide() {
        let short: ProfessionalId = "p1".parse().unwrap();
        let long: ProfessionalId = "p10".parse().unwrap();
        let key = history_key(&long, 1);
        assert!(!key.starts_with(&professional_prefix(&short)));
    }
}
