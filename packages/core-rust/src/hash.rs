//! FNV-1a hashing used to map keys onto partitions.
//!
//! The hash is computed over raw bytes, so string keys and binary keys that
//! share a byte representation land on the same partition.

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes a 32-bit FNV-1a hash over a byte slice.
///
/// # Examples
///
/// ```
/// use gridexec_core::hash::fnv1a_hash;
///
/// assert_eq!(fnv1a_hash(b"hello"), 1_335_831_723);
/// assert_eq!(fnv1a_hash(b""), 2_166_136_261); // FNV offset basis
/// ```
#[must_use]
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_hash_known_vectors() {
        assert_eq!(fnv1a_hash(b"hello"), 1_335_831_723);
        assert_eq!(fnv1a_hash(b"key1"), 927_623_783);
        assert_eq!(fnv1a_hash(b""), 2_166_136_261); // 0x811c9dc5
    }

    #[test]
    fn fnv1a_hash_is_case_sensitive() {
        assert_ne!(fnv1a_hash(b"Hello"), fnv1a_hash(b"hello"));
    }

    #[test]
    fn fnv1a_hash_spreads_sequential_keys() {
        let mut set = std::collections::HashSet::new();
        for i in 0..1000 {
            set.insert(fnv1a_hash(format!("item-{i}").as_bytes()));
        }
        assert_eq!(set.len(), 1000);
    }
}
