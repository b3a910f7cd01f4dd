//! Generic operation threads.

use std::sync::Arc;

use super::{OperationThread, RunnerResolver};
use crate::operation::OperationTarget;
use crate::runner::OperationRunner;

/// An [`OperationThread`] for partition-independent work, e.g. administrative
/// operations. Kept in its own pool so long-running generic work cannot starve
/// partition threads and vice versa.
pub type GenericOperationThread = OperationThread<GenericRunnerResolver>;

/// Resolves every generic operation to one fixed generic runner: generic
/// thread `i` always uses generic runner `i`.
#[derive(Debug, Clone)]
pub struct GenericRunnerResolver {
    runners: Arc<[OperationRunner]>,
    index: usize,
}

impl GenericRunnerResolver {
    pub(crate) fn new(runners: Arc<[OperationRunner]>, index: usize) -> Self {
        Self { runners, index }
    }
}

impl RunnerResolver for GenericRunnerResolver {
    fn operation_runner(&self, target: OperationTarget) -> Option<&OperationRunner> {
        match target {
            OperationTarget::Generic => self.runners.get(self.index),
            OperationTarget::Partition(_) => None,
        }
    }
}
