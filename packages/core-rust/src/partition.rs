//! Partition ids, key hashing, and the static partition-to-thread assignment.
//!
//! The grid splits its keyspace into a fixed number of partitions. The
//! operation executor pins every partition to exactly one worker thread for
//! its whole lifetime; [`PartitionThreadMap`] is that assignment.
//!
//! - [`PARTITION_COUNT`]: default number of partitions (271, a prime)
//! - [`hash_to_partition`]: maps a key to a partition id in `[0, count)`
//! - [`PartitionThreadMap`]: `partition_id mod thread_count` ownership

use serde::{Deserialize, Serialize};

use crate::hash::fnv1a_hash;

/// Partition identifier. Always in `[0, partition_count)`.
pub type PartitionId = u32;

/// Default number of partitions. A prime chosen for uniform modulo distribution.
pub const PARTITION_COUNT: u32 = 271;

// ---------------------------------------------------------------------------
// hash_to_partition
// ---------------------------------------------------------------------------

/// Compute the partition id for a key.
///
/// # Panics
///
/// Panics if `partition_count` is zero.
///
/// # Examples
///
/// ```
/// use gridexec_core::partition::{hash_to_partition, PARTITION_COUNT};
///
/// assert_eq!(hash_to_partition(b"hello", PARTITION_COUNT), 95);
/// assert_eq!(hash_to_partition(b"key1", PARTITION_COUNT), 268);
/// ```
#[must_use]
pub fn hash_to_partition(key: &[u8], partition_count: u32) -> PartitionId {
    fnv1a_hash(key) % partition_count
}

// ---------------------------------------------------------------------------
// PartitionThreadMap
// ---------------------------------------------------------------------------

/// Static assignment of partitions to partition threads.
///
/// Partition `p` is owned by thread `p mod thread_count`. The map is computed
/// once when the executor is built and never changes while it runs; moving a
/// partition to another thread requires building a new executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionThreadMap {
    partition_count: u32,
    thread_count: usize,
}

impl PartitionThreadMap {
    /// Creates a map. Returns `None` if either count is zero.
    #[must_use]
    pub fn new(partition_count: u32, thread_count: usize) -> Option<Self> {
        if partition_count == 0 || thread_count == 0 {
            return None;
        }
        Some(Self {
            partition_count,
            thread_count,
        })
    }

    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Whether `partition_id` is inside `[0, partition_count)`.
    #[must_use]
    pub fn is_valid(&self, partition_id: PartitionId) -> bool {
        partition_id < self.partition_count
    }

    /// Index of the thread owning `partition_id`.
    ///
    /// The result is only meaningful for valid partition ids; callers check
    /// [`is_valid`](Self::is_valid) first.
    #[must_use]
    pub fn thread_for(&self, partition_id: PartitionId) -> usize {
        partition_id as usize % self.thread_count
    }

    /// Whether `thread_index` owns `partition_id`.
    #[must_use]
    pub fn owns(&self, thread_index: usize, partition_id: PartitionId) -> bool {
        self.is_valid(partition_id) && self.thread_for(partition_id) == thread_index
    }

    /// All partitions owned by `thread_index`, ascending.
    pub fn partitions_of(&self, thread_index: usize) -> impl Iterator<Item = PartitionId> {
        let step = self.thread_count;
        let end = self.partition_count;
        let start = if thread_index < self.thread_count {
            u32::try_from(thread_index).unwrap_or(end)
        } else {
            end
        };
        (start..end).step_by(step)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn rejects_zero_counts() {
        assert!(PartitionThreadMap::new(0, 2).is_none());
        assert!(PartitionThreadMap::new(4, 0).is_none());
    }

    #[test]
    fn four_partitions_over_two_threads() {
        let map = PartitionThreadMap::new(4, 2).unwrap();
        assert_eq!(map.partitions_of(0).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(map.partitions_of(1).collect::<Vec<_>>(), vec![1, 3]);
        assert!(map.owns(1, 3));
        assert!(!map.owns(0, 3));
    }

    #[test]
    fn out_of_range_partition_is_not_owned() {
        let map = PartitionThreadMap::new(4, 2).unwrap();
        assert!(!map.is_valid(4));
        assert!(!map.owns(0, 4));
    }

    #[test]
    fn more_threads_than_partitions_leaves_idle_threads() {
        let map = PartitionThreadMap::new(2, 4).unwrap();
        assert_eq!(map.partitions_of(3).count(), 0);
        assert_eq!(map.partitions_of(1).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn hash_to_partition_is_in_range() {
        for i in 0..500 {
            let key = format!("key-{i}");
            assert!(hash_to_partition(key.as_bytes(), PARTITION_COUNT) < PARTITION_COUNT);
        }
    }

    proptest! {
        #[test]
        fn every_partition_has_exactly_one_owner(
            partitions in 1u32..600,
            threads in 1usize..40,
        ) {
            let map = PartitionThreadMap::new(partitions, threads).unwrap();
            for pid in 0..partitions {
                let owners = (0..threads).filter(|t| map.owns(*t, pid)).count();
                prop_assert_eq!(owners, 1);
            }
            let assigned: usize = (0..threads).map(|t| map.partitions_of(t).count()).sum();
            prop_assert_eq!(assigned, partitions as usize);
        }

        #[test]
        fn thread_for_is_deterministic(pid in 0u32..10_000, threads in 1usize..64) {
            let a = PartitionThreadMap::new(10_000, threads).unwrap();
            let b = PartitionThreadMap::new(10_000, threads).unwrap();
            prop_assert_eq!(a.thread_for(pid), b.thread_for(pid));
            prop_assert_eq!(a.thread_for(pid), pid as usize % threads);
        }
    }
}
