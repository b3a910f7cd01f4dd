//! gridexec executor: partition-pinned operation threads with dual-lane
//! schedule queues.
//!
//! Every partition is owned by exactly one partition thread, so operations on
//! the same partition run one at a time and in submission order without any
//! per-partition locking. Partition-independent work runs on a separate pool
//! of generic threads.

pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod operation;
pub mod queue;
pub mod runner;
pub mod thread;

pub use config::{ConfigError, ExecutorConfig};
pub use error::ExecutorError;
pub use executor::OperationExecutor;
pub use lifecycle::{ExecutorHealth, ExecutorState};
pub use metrics::ThreadStats;
pub use operation::{
    callback, CallbackSink, CompletionSink, Operation, OperationContext, OperationError,
    OperationResponse, OperationResult, OperationTarget, ResponseReceiver,
};
pub use runner::{OperationRunner, PartitionState, RunnerContext, RunnerKind, RunnerStats};
pub use thread::{FatalErrorHandler, LogFatalErrorHandler, ThreadFatal, ThreadKind, WorkerState};
