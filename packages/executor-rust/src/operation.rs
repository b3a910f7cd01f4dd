//! Operations: the units of work scheduled by the executor.
//!
//! An [`Operation`] bundles a target (a partition id or "generic"), scheduling
//! hints (urgency, deadline, cancellation), the effect to execute, and the
//! [`CompletionSink`] that receives the outcome. The executor owns scheduling
//! once an operation is submitted; the sink's receiving side stays with the
//! caller.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use gridexec_core::{hash_to_partition, PartitionId, Value};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::runner::{panic_message, RunnerContext, RunnerKind};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome delivered to an operation's completion sink.
pub type OperationResult = Result<OperationResponse, OperationError>;

/// Receiving side of [`Operation::with_reply`]. Await it from async code or
/// call `blocking_recv()` from a plain thread.
pub type ResponseReceiver = oneshot::Receiver<OperationResult>;

/// The executable part of an operation.
pub type Effect =
    Box<dyn FnOnce(&mut RunnerContext<'_>) -> anyhow::Result<OperationResponse> + Send>;

// ---------------------------------------------------------------------------
// OperationTarget
// ---------------------------------------------------------------------------

/// Where an operation runs: on the owner thread of one partition, or on any
/// generic thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTarget {
    Partition(PartitionId),
    Generic,
}

impl OperationTarget {
    /// Target the partition that `key` hashes to.
    ///
    /// # Panics
    ///
    /// Panics if `partition_count` is zero.
    #[must_use]
    pub fn for_key(key: &[u8], partition_count: u32) -> Self {
        Self::Partition(hash_to_partition(key, partition_count))
    }

    #[must_use]
    pub fn partition_id(self) -> Option<PartitionId> {
        match self {
            Self::Partition(pid) => Some(pid),
            Self::Generic => None,
        }
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(pid) => write!(f, "partition {pid}"),
            Self::Generic => f.write_str("generic"),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

/// Scheduling metadata carried with every operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub target: OperationTarget,
    pub urgent: bool,
    pub deadline: Option<Instant>,
    pub created_at: Instant,
}

impl OperationContext {
    fn new(target: OperationTarget) -> Self {
        Self {
            call_id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            target,
            urgent: false,
            deadline: None,
            created_at: Instant::now(),
        }
    }

    /// How far past its deadline the operation is at `now`, if at all.
    #[must_use]
    pub fn overdue_at(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|deadline| now >= *deadline)
            .map(|deadline| now - deadline)
    }
}

// ---------------------------------------------------------------------------
// CompletionSink
// ---------------------------------------------------------------------------

/// Receives the outcome of an operation exactly once.
///
/// Implemented by the caller. The executor never inspects the result; it only
/// guarantees that every accepted operation reaches its sink.
pub trait CompletionSink: Send + 'static {
    fn complete(self: Box<Self>, result: OperationResult);
}

impl CompletionSink for oneshot::Sender<OperationResult> {
    fn complete(self: Box<Self>, result: OperationResult) {
        // The caller may have stopped waiting; nothing left to notify.
        let _ = (*self).send(result);
    }
}

/// Sink that hands the outcome to a closure.
pub struct CallbackSink<F>(F);

impl<F> CompletionSink for CallbackSink<F>
where
    F: FnOnce(OperationResult) + Send + 'static,
{
    fn complete(self: Box<Self>, result: OperationResult) {
        (self.0)(result);
    }
}

/// Wrap a closure as a [`CompletionSink`].
pub fn callback<F>(f: F) -> CallbackSink<F>
where
    F: FnOnce(OperationResult) + Send + 'static,
{
    CallbackSink(f)
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A unit of work bound to a partition or to the generic pool.
pub struct Operation {
    ctx: OperationContext,
    cancel: Option<CancellationToken>,
    effect: Effect,
    sink: Box<dyn CompletionSink>,
}

impl Operation {
    /// Creates an operation delivering its outcome to `sink`.
    pub fn new<E, S>(target: OperationTarget, effect: E, sink: S) -> Self
    where
        E: FnOnce(&mut RunnerContext<'_>) -> anyhow::Result<OperationResponse> + Send + 'static,
        S: CompletionSink,
    {
        Self {
            ctx: OperationContext::new(target),
            cancel: None,
            effect: Box::new(effect),
            sink: Box::new(sink),
        }
    }

    /// Creates an operation together with a receiver for its outcome.
    pub fn with_reply<E>(target: OperationTarget, effect: E) -> (Self, ResponseReceiver)
    where
        E: FnOnce(&mut RunnerContext<'_>) -> anyhow::Result<OperationResponse> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        (Self::new(target, effect, tx), rx)
    }

    /// Marks the operation urgent: it is queued in the urgent lane and
    /// overtakes any normal backlog on its thread.
    #[must_use]
    pub fn urgent(mut self) -> Self {
        self.ctx.urgent = true;
        self
    }

    /// Fail the operation without running it if `deadline` has passed when
    /// its turn comes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.ctx.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Attach a token; cancelling it while the operation is queued makes the
    /// runner fail it with [`OperationError::Cancelled`] instead of running it.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        &self.ctx
    }

    #[must_use]
    pub fn target(&self) -> OperationTarget {
        self.ctx.target
    }

    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.ctx.urgent
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Deliver `error` to the sink without running the effect.
    pub(crate) fn fail(self, error: OperationError) {
        self.sink.complete(Err(error));
    }

    pub(crate) fn into_parts(self) -> OperationParts {
        OperationParts {
            ctx: self.ctx,
            cancel: self.cancel,
            effect: self.effect,
            sink: self.sink,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("ctx", &self.ctx)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Fails every operation in `ops` with the error built by `error`.
///
/// A panicking sink is logged and skipped; the remaining operations are still
/// failed. Returns how many operations were failed.
pub(crate) fn fail_all<I, F>(ops: I, error: F) -> usize
where
    I: IntoIterator<Item = Operation>,
    F: Fn() -> OperationError,
{
    let mut failed = 0_usize;
    for op in ops {
        let call_id = op.ctx.call_id;
        let failure = error();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| op.fail(failure))) {
            let message = panic_message(payload.as_ref());
            error!(call_id, %message, "completion sink panicked while failing operation");
        }
        failed += 1;
    }
    failed
}

/// An operation taken apart by the runner.
pub(crate) struct OperationParts {
    pub(crate) ctx: OperationContext,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) effect: Effect,
    pub(crate) sink: Box<dyn CompletionSink>,
}

// ---------------------------------------------------------------------------
// OperationResponse / OperationError
// ---------------------------------------------------------------------------

/// Successful outcome of an operation's effect.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    Ack { call_id: u64 },
    Value(Value),
    Empty,
}

/// Typed failure delivered to an operation's completion sink.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("operation failed: {0:#}")]
    Failed(#[from] anyhow::Error),
    #[error("operation panicked: {message}")]
    Panicked { message: String },
    #[error("deadline exceeded by {overdue_ms}ms before execution")]
    DeadlineExceeded { overdue_ms: u64 },
    #[error("operation cancelled before execution")]
    Cancelled,
    #[error("executor is shutting down, operation rejected")]
    QueueClosed,
    #[error("normal lane of {thread} is full")]
    Overloaded { thread: String },
    #[error("operation discarded during executor shutdown")]
    Discarded,
    #[error("partition {partition_id} out of range [0, {partition_count})")]
    InvalidPartition {
        partition_id: PartitionId,
        partition_count: u32,
    },
    #[error("operation for {target} reached {thread}, which does not own it")]
    Misrouted {
        target: OperationTarget,
        thread: String,
    },
    #[error("current thread does not own {target}")]
    NotOwnerThread { target: OperationTarget },
    #[error("runner {runner} is already executing an operation on this thread")]
    ReentrantExecution { runner: RunnerKind },
    #[error("runner {runner} invoked concurrently from two threads")]
    ExclusivityViolation { runner: RunnerKind },
    #[error("operation thread {thread} died; partition ownership is undefined")]
    WorkerFailed { thread: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
