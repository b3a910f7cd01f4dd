//! Operation threads: dedicated OS threads that drain one schedule queue each.
//!
//! [`OperationThread`] is the shared worker loop. What distinguishes a
//! partition thread from a generic thread is only how it resolves the runner
//! for an operation, which is the [`RunnerResolver`] it is built with:
//!
//! - [`PartitionOperationThread`]: indexes the shared per-partition runner array
//! - [`GenericOperationThread`]: always uses its own generic runner
//!
//! A thread that dies through a panic escaping its loop is fatal: partition
//! ownership can no longer be trusted, so the thread is marked failed, its
//! queue is closed, pending operations are failed, and the executor's
//! [`FatalErrorHandler`] is invoked. The thread is never respawned.

pub mod generic;
pub mod partition;

use std::any::Any;
use std::cell::Cell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{debug, error, info_span};

pub use generic::{GenericOperationThread, GenericRunnerResolver};
pub use partition::{PartitionOperationThread, PartitionRunnerResolver};

use crate::metrics::ThreadStats;
use crate::operation::{fail_all, Operation, OperationError, OperationTarget};
use crate::queue::ScheduleQueue;
use crate::runner::{panic_message, OperationRunner};

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerIdentity>> = const { Cell::new(None) };
}

// ---------------------------------------------------------------------------
// ThreadKind / WorkerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    Partition,
    Generic,
}

impl ThreadKind {
    fn label(self) -> &'static str {
        match self {
            Self::Partition => "partition-operation",
            Self::Generic => "generic-operation",
        }
    }
}

/// Worker state machine: Starting -> Running -> Stopping -> Stopped.
/// `Failed` is terminal and reached only when the loop itself dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerIdentity
// ---------------------------------------------------------------------------

/// Which executor thread the current OS thread is, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerIdentity {
    pub(crate) executor_id: u64,
    pub(crate) kind: ThreadKind,
    pub(crate) index: usize,
}

/// Identity of the calling thread, or `None` outside operation threads.
pub(crate) fn current_worker() -> Option<WorkerIdentity> {
    CURRENT_WORKER.with(Cell::get)
}

// ---------------------------------------------------------------------------
// Fatal error handling
// ---------------------------------------------------------------------------

/// Description of an operation thread whose loop died.
#[derive(Debug, Clone)]
pub struct ThreadFatal {
    pub thread: String,
    pub kind: ThreadKind,
    pub index: usize,
    pub reason: String,
}

/// Escalation hook for worker death.
///
/// Called on the dying thread after its queue has been closed and its pending
/// operations failed. Implementations typically trigger process-level failure
/// handling (for example, aborting the node).
pub trait FatalErrorHandler: Send + Sync + 'static {
    fn on_thread_fatal(&self, fatal: &ThreadFatal);
}

/// Default handler: logs and leaves escalation to whoever watches the logs
/// and `OperationExecutor::health`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFatalErrorHandler;

impl FatalErrorHandler for LogFatalErrorHandler {
    fn on_thread_fatal(&self, fatal: &ThreadFatal) {
        error!(
            thread = %fatal.thread,
            reason = %fatal.reason,
            "operation thread died; node must be restarted"
        );
    }
}

// ---------------------------------------------------------------------------
// RunnerResolver
// ---------------------------------------------------------------------------

/// Resolves the runner an operation thread uses for an operation target.
pub trait RunnerResolver: Send + 'static {
    /// The runner for `target`, or `None` if this thread must not run it.
    fn operation_runner(&self, target: OperationTarget) -> Option<&OperationRunner>;
}

// ---------------------------------------------------------------------------
// ThreadShared
// ---------------------------------------------------------------------------

/// The part of an operation thread visible to the executor.
#[derive(Debug)]
pub(crate) struct ThreadShared {
    pub(crate) name: String,
    pub(crate) kind: ThreadKind,
    pub(crate) index: usize,
    pub(crate) queue: ScheduleQueue<Operation>,
    state: AtomicU8,
    processed: AtomicU64,
}

impl ThreadShared {
    pub(crate) fn new(prefix: &str, kind: ThreadKind, index: usize, capacity: Option<usize>) -> Self {
        Self {
            name: format!("{prefix}.{}.thread-{index}", kind.label()),
            kind,
            index,
            queue: ScheduleQueue::new(capacity),
            state: AtomicU8::new(WorkerState::Starting as u8),
            processed: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves a live thread to `Stopping`. Failed or stopped threads keep
    /// their state.
    pub(crate) fn begin_stopping(&self) {
        if !self.transition(WorkerState::Running, WorkerState::Stopping) {
            self.transition(WorkerState::Starting, WorkerState::Stopping);
        }
    }

    /// Marks a thread that will never run (never spawned) as stopped.
    pub(crate) fn mark_stopped_if_idle(&self) {
        if !self.transition(WorkerState::Stopping, WorkerState::Stopped) {
            self.transition(WorkerState::Starting, WorkerState::Stopped);
        }
    }

    pub(crate) fn mark_failed(&self) {
        self.set_state(WorkerState::Failed);
    }

    pub(crate) fn stats(&self) -> ThreadStats {
        let (urgent_depth, normal_depth) = self.queue.lane_sizes();
        ThreadStats {
            name: self.name.clone(),
            kind: self.kind,
            index: self.index,
            state: self.state(),
            urgent_depth,
            normal_depth,
            processed: self.processed.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationThread
// ---------------------------------------------------------------------------

/// The worker loop shared by partition and generic threads.
///
/// Runs on a dedicated OS thread for its whole life:
/// 1. Blocking-pop the next operation from its own queue
/// 2. Resolve the runner through `R`
/// 3. Run it (the runner delivers the outcome to the operation's sink)
/// 4. Repeat until the queue is closed and empty
pub struct OperationThread<R: RunnerResolver> {
    shared: Arc<ThreadShared>,
    resolver: R,
    identity: WorkerIdentity,
    fatal_handler: Arc<dyn FatalErrorHandler>,
}

impl<R: RunnerResolver> OperationThread<R> {
    pub(crate) fn new(
        shared: Arc<ThreadShared>,
        resolver: R,
        executor_id: u64,
        fatal_handler: Arc<dyn FatalErrorHandler>,
    ) -> Self {
        let identity = WorkerIdentity {
            executor_id,
            kind: shared.kind,
            index: shared.index,
        };
        Self {
            shared,
            resolver,
            identity,
            fatal_handler,
        }
    }

    /// Spawns the dedicated OS thread running this loop.
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || self.run())
    }

    fn run(self) {
        CURRENT_WORKER.with(|current| current.set(Some(self.identity)));
        let span = info_span!("operation_thread", thread = %self.shared.name);
        let _entered = span.enter();

        self.shared.transition(WorkerState::Starting, WorkerState::Running);
        debug!("operation thread started");

        match panic::catch_unwind(AssertUnwindSafe(|| self.run_loop())) {
            Ok(()) => {
                self.shared.set_state(WorkerState::Stopped);
                debug!(
                    processed = self.shared.processed.load(Ordering::Relaxed),
                    "operation thread stopped"
                );
            }
            Err(payload) => self.die(payload.as_ref()),
        }

        CURRENT_WORKER.with(|current| current.set(None));
    }

    fn run_loop(&self) {
        while let Some(op) = self.shared.queue.pop(true) {
            self.process(op);
        }
    }

    fn process(&self, op: Operation) {
        let target = op.target();
        match self.resolver.operation_runner(target) {
            Some(runner) => runner.run(op),
            None => {
                error!(%target, "operation reached a thread that does not own it");
                op.fail(OperationError::Misrouted {
                    target,
                    thread: self.shared.name.clone(),
                });
            }
        }
        self.shared.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn die(&self, payload: &(dyn Any + Send)) {
        self.shared.mark_failed();
        let reason = panic_message(payload);
        error!(%reason, "operation thread loop panicked");

        self.shared.queue.close();
        fail_all(self.shared.queue.drain(), || OperationError::WorkerFailed {
            thread: self.shared.name.clone(),
        });

        self.fatal_handler.on_thread_fatal(&ThreadFatal {
            thread: self.shared.name.clone(),
            kind: self.shared.kind,
            index: self.shared.index,
            reason,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
