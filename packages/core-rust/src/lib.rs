//! `gridexec` Core: partition ids, key hashing, partition-to-thread assignment,
//! and the value type shared by operation effects.

pub mod hash;
pub mod partition;
pub mod types;

pub use partition::{hash_to_partition, PartitionId, PartitionThreadMap, PARTITION_COUNT};
pub use types::Value;
