use gridexec_core::PartitionId;

use crate::config::ConfigError;
use crate::operation::{OperationError, OperationTarget};

/// Errors returned to callers of the executor API.
///
/// When a submission is rejected, the same condition is also delivered to the
/// operation's completion sink, so callers waiting on the sink are never left
/// hanging.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor is shutting down, operation rejected")]
    QueueClosed,
    #[error("normal lane of {thread} is full")]
    Overloaded { thread: String },
    #[error("partition {partition_id} out of range [0, {partition_count})")]
    InvalidPartition {
        partition_id: PartitionId,
        partition_count: u32,
    },
    #[error("current thread does not own {target}")]
    NotOwnerThread { target: OperationTarget },
    #[error("executor has been shut down")]
    Terminated,
    #[error("shutdown cannot be called from one of the executor's own operation threads")]
    ShutdownFromOperationThread,
    #[error("failed to spawn operation thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("operation threads died: {}", .threads.join(", "))]
    ThreadFatal { threads: Vec<String> },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ExecutorError {
    /// The failure delivered to the sink of an operation rejected with `self`.
    pub(crate) fn to_operation_error(&self) -> OperationError {
        match self {
            Self::Overloaded { thread } => OperationError::Overloaded {
                thread: thread.clone(),
            },
            Self::InvalidPartition {
                partition_id,
                partition_count,
            } => OperationError::InvalidPartition {
                partition_id: *partition_id,
                partition_count: *partition_count,
            },
            Self::NotOwnerThread { target } => OperationError::NotOwnerThread { target: *target },
            Self::ThreadFatal { threads } => OperationError::WorkerFailed {
                thread: threads.join(", "),
            },
            _ => OperationError::QueueClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_maps_to_matching_operation_error() {
        let err = ExecutorError::InvalidPartition {
            partition_id: 9,
            partition_count: 4,
        };
        assert!(matches!(
            err.to_operation_error(),
            OperationError::InvalidPartition { partition_id: 9, partition_count: 4 }
        ));
        assert!(matches!(
            ExecutorError::QueueClosed.to_operation_error(),
            OperationError::QueueClosed
        ));
        assert!(matches!(
            ExecutorError::ThreadFatal { threads: vec!["t-1".into()] }.to_operation_error(),
            OperationError::WorkerFailed { thread } if thread == "t-1"
        ));
    }

    #[test]
    fn thread_fatal_lists_threads() {
        let err = ExecutorError::ThreadFatal {
            threads: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "operation threads died: a, b");
    }
}
