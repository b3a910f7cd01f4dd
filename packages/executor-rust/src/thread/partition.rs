//! Partition operation threads.

use std::sync::Arc;

use gridexec_core::PartitionThreadMap;

use super::{OperationThread, RunnerResolver};
use crate::operation::OperationTarget;
use crate::runner::OperationRunner;

/// An [`OperationThread`] that executes operations for the partitions it
/// owns, e.g. a map get or put.
pub type PartitionOperationThread = OperationThread<PartitionRunnerResolver>;

/// Resolves partition operations to the runner of their partition.
///
/// Holds a shared read-only view of the full runner array; the executor owns
/// the array. Each slot is only ever used by the one thread owning that
/// partition, so indexing needs no synchronization beyond the `Arc`.
#[derive(Debug, Clone)]
pub struct PartitionRunnerResolver {
    runners: Arc<[OperationRunner]>,
    map: PartitionThreadMap,
    thread_index: usize,
}

impl PartitionRunnerResolver {
    pub(crate) fn new(
        runners: Arc<[OperationRunner]>,
        map: PartitionThreadMap,
        thread_index: usize,
    ) -> Self {
        Self {
            runners,
            map,
            thread_index,
        }
    }
}

impl RunnerResolver for PartitionRunnerResolver {
    /// O(1) lookup by partition id. Generic operations and partitions owned
    /// by other threads resolve to nothing.
    fn operation_runner(&self, target: OperationTarget) -> Option<&OperationRunner> {
        match target {
            OperationTarget::Partition(pid) if self.map.owns(self.thread_index, pid) => {
                self.runners.get(pid as usize)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerKind;

    fn runners(count: u32) -> Arc<[OperationRunner]> {
        (0..count)
            .map(|pid| OperationRunner::new(RunnerKind::Partition(pid), true))
            .collect()
    }

    #[test]
    fn resolves_only_owned_partitions() {
        let map = PartitionThreadMap::new(4, 2).unwrap();
        let resolver = PartitionRunnerResolver::new(runners(4), map, 1);

        let runner = resolver
            .operation_runner(OperationTarget::Partition(3))
            .unwrap();
        assert_eq!(runner.kind(), RunnerKind::Partition(3));
        assert!(resolver.operation_runner(OperationTarget::Partition(1)).is_some());
        assert!(resolver.operation_runner(OperationTarget::Partition(2)).is_none());
        assert!(resolver.operation_runner(OperationTarget::Partition(9)).is_none());
        assert!(resolver.operation_runner(OperationTarget::Generic).is_none());
    }
}
