//! Operation runners: execute one operation at a time against owned state.
//!
//! There is one [`OperationRunner`] per partition and one per generic thread.
//! A runner never executes two operations at once because exactly one thread
//! ever calls it; the lock around its state is never contended on a healthy
//! executor and exists only so that misuse is detected instead of racing.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use gridexec_core::{PartitionId, Value};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::metrics::record_outcome;
use crate::operation::{Operation, OperationError, OperationParts, OperationTarget};

static NEXT_RUNNER_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Serials of the runners currently executing an effect on this thread.
    static EXECUTING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

// ---------------------------------------------------------------------------
// RunnerKind
// ---------------------------------------------------------------------------

/// Identity of a runner within its executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Partition(PartitionId),
    Generic(usize),
}

impl RunnerKind {
    fn label(self) -> &'static str {
        match self {
            Self::Partition(_) => "partition",
            Self::Generic(_) => "generic",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(pid) => write!(f, "partition-{pid}"),
            Self::Generic(index) => write!(f, "generic-{index}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PartitionState
// ---------------------------------------------------------------------------

/// State owned by a single runner.
///
/// Data-structure engines keep their per-partition records here, keyed by
/// name. Only effects running on the owning runner can reach it.
#[derive(Debug, Default)]
pub struct PartitionState {
    entries: HashMap<String, Value>,
}

impl PartitionState {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Value for `key`, inserting the result of `default` first if absent.
    pub fn get_or_insert_with(
        &mut self,
        key: impl Into<String>,
        default: impl FnOnce() -> Value,
    ) -> &mut Value {
        self.entries.entry(key.into()).or_insert_with(default)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RunnerContext
// ---------------------------------------------------------------------------

/// What an effect sees while it runs.
pub struct RunnerContext<'a> {
    call_id: u64,
    target: OperationTarget,
    runner: RunnerKind,
    state: &'a mut PartitionState,
}

impl RunnerContext<'_> {
    #[must_use]
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    #[must_use]
    pub fn target(&self) -> OperationTarget {
        self.target
    }

    #[must_use]
    pub fn partition_id(&self) -> Option<PartitionId> {
        self.target.partition_id()
    }

    #[must_use]
    pub fn runner(&self) -> RunnerKind {
        self.runner
    }

    #[must_use]
    pub fn state(&self) -> &PartitionState {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut PartitionState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// OperationRunner
// ---------------------------------------------------------------------------

/// Counters for a single runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunnerStats {
    pub executed: u64,
    pub failed: u64,
    pub expired: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

/// Executes operations synchronously on the calling thread.
///
/// Outcomes go to each operation's completion sink; `run` itself returns
/// nothing. Errors and panics raised by an effect are converted into failures
/// here and never unwind into the caller.
#[derive(Debug)]
pub struct OperationRunner {
    kind: RunnerKind,
    serial: u64,
    deadline_check: bool,
    state: Mutex<PartitionState>,
    executed: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl OperationRunner {
    pub(crate) fn new(kind: RunnerKind, deadline_check: bool) -> Self {
        Self {
            kind,
            serial: NEXT_RUNNER_SERIAL.fetch_add(1, Ordering::Relaxed),
            deadline_check,
            state: Mutex::new(PartitionState::default()),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Executes `op` and delivers its outcome to the operation's sink.
    ///
    /// Callers must only invoke this from the thread owning the runner: the
    /// executor's operation threads, or a caller that passed
    /// `OperationExecutor::is_owner_thread`.
    pub fn run(&self, op: Operation) {
        let OperationParts {
            ctx,
            cancel,
            effect,
            sink,
        } = op.into_parts();

        if cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            record_outcome(self.kind.label(), "cancelled");
            debug!(call_id = ctx.call_id, runner = %self.kind, "operation cancelled while queued");
            sink.complete(Err(OperationError::Cancelled));
            return;
        }

        if self.deadline_check {
            if let Some(overdue) = ctx.overdue_at(Instant::now()) {
                self.expired.fetch_add(1, Ordering::Relaxed);
                record_outcome(self.kind.label(), "expired");
                let overdue_ms = u64::try_from(overdue.as_millis()).unwrap_or(u64::MAX);
                debug!(call_id = ctx.call_id, runner = %self.kind, overdue_ms, "operation expired before execution");
                sink.complete(Err(OperationError::DeadlineExceeded { overdue_ms }));
                return;
            }
        }

        let Some(mut state) = self.state.try_lock() else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            record_outcome(self.kind.label(), "rejected");
            let error = if is_executing(self.serial) {
                warn!(call_id = ctx.call_id, runner = %self.kind, "nested execution on the same runner rejected");
                OperationError::ReentrantExecution { runner: self.kind }
            } else {
                error!(call_id = ctx.call_id, runner = %self.kind, "runner invoked concurrently from two threads");
                OperationError::ExclusivityViolation { runner: self.kind }
            };
            sink.complete(Err(error));
            return;
        };

        let outcome = {
            let _executing = ExecutingGuard::enter(self.serial);
            let mut run_ctx = RunnerContext {
                call_id: ctx.call_id,
                target: ctx.target,
                runner: self.kind,
                state: &mut *state,
            };
            panic::catch_unwind(AssertUnwindSafe(|| effect(&mut run_ctx)))
        };
        drop(state);

        let result = match outcome {
            Ok(Ok(response)) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                record_outcome(self.kind.label(), "ok");
                Ok(response)
            }
            Ok(Err(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                record_outcome(self.kind.label(), "failed");
                debug!(call_id = ctx.call_id, runner = %self.kind, error = %err, "operation failed");
                Err(OperationError::Failed(err))
            }
            Err(payload) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                record_outcome(self.kind.label(), "panicked");
                let message = panic_message(payload.as_ref());
                warn!(call_id = ctx.call_id, runner = %self.kind, %message, "operation panicked");
                Err(OperationError::Panicked { message })
            }
        };
        sink.complete(result);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Marks a runner as executing on the current thread for the guard's lifetime.
struct ExecutingGuard {
    serial: u64,
}

impl ExecutingGuard {
    fn enter(serial: u64) -> Self {
        EXECUTING.with(|executing| executing.borrow_mut().push(serial));
        Self { serial }
    }
}

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        EXECUTING.with(|executing| {
            let mut executing = executing.borrow_mut();
            if let Some(pos) = executing.iter().rposition(|s| *s == self.serial) {
                executing.remove(pos);
            }
        });
    }
}

fn is_executing(serial: u64) -> bool {
    EXECUTING.with(|executing| executing.borrow().contains(&serial))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
