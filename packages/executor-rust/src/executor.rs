//! The operation executor: owns the operation threads and routes operations.
//!
//! Partition operations go to the partition thread owning their partition
//! (`partition_id mod partition_thread_count`); generic operations go to the
//! generic threads round-robin. The assignment is computed once at
//! construction and never changes, which is what gives every partition a
//! single executing thread without any per-partition locking.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gridexec_core::{PartitionId, PartitionThreadMap};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ExecutorConfig};
use crate::error::ExecutorError;
use crate::lifecycle::{ExecutorHealth, ExecutorState, Lifecycle};
use crate::metrics::{publish_thread_stats, ThreadStats};
use crate::operation::{fail_all, Operation, OperationError, OperationTarget};
use crate::queue::PushError;
use crate::runner::{OperationRunner, RunnerKind};
use crate::thread::{
    current_worker, FatalErrorHandler, GenericOperationThread, GenericRunnerResolver,
    LogFatalErrorHandler, OperationThread, PartitionOperationThread, PartitionRunnerResolver,
    RunnerResolver, ThreadKind, ThreadShared, WorkerState,
};

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Façade over the partition and generic operation threads.
///
/// Lifecycle: `new()` allocates runners and queues, `start()` spawns the
/// threads, `shutdown()` stops them exactly once. Operations submitted before
/// `start()` are queued and run once the threads are up.
pub struct OperationExecutor {
    id: u64,
    config: ExecutorConfig,
    map: PartitionThreadMap,
    partition_runners: Arc<[OperationRunner]>,
    generic_runners: Arc<[OperationRunner]>,
    partition_threads: Vec<Arc<ThreadShared>>,
    generic_threads: Vec<Arc<ThreadShared>>,
    next_generic: AtomicUsize,
    lifecycle: Lifecycle,
    handles: Mutex<Vec<JoinHandle<()>>>,
    fatal_handler: Arc<dyn FatalErrorHandler>,
}

impl OperationExecutor {
    /// Builds an executor that logs worker death through
    /// [`LogFatalErrorHandler`].
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Config` if the configuration is invalid.
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::with_fatal_handler(config, Arc::new(LogFatalErrorHandler))
    }

    /// Builds an executor escalating worker death to `fatal_handler`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Config` if the configuration is invalid.
    pub fn with_fatal_handler(
        config: ExecutorConfig,
        fatal_handler: Arc<dyn FatalErrorHandler>,
    ) -> Result<Self, ExecutorError> {
        config.validate()?;
        let map = PartitionThreadMap::new(config.partition_count, config.partition_thread_count)
            .ok_or(ConfigError::ZeroPartitions)?;

        let deadline_check = config.operation_deadline_check_enabled;
        let partition_runners: Arc<[OperationRunner]> = (0..config.partition_count)
            .map(|pid| OperationRunner::new(RunnerKind::Partition(pid), deadline_check))
            .collect();
        let generic_runners: Arc<[OperationRunner]> = (0..config.generic_thread_count)
            .map(|index| OperationRunner::new(RunnerKind::Generic(index), deadline_check))
            .collect();

        let make_threads = |kind: ThreadKind, count: usize| -> Vec<Arc<ThreadShared>> {
            (0..count)
                .map(|index| {
                    Arc::new(ThreadShared::new(
                        &config.thread_name_prefix,
                        kind,
                        index,
                        config.queue_capacity,
                    ))
                })
                .collect()
        };
        let partition_threads = make_threads(ThreadKind::Partition, config.partition_thread_count);
        let generic_threads = make_threads(ThreadKind::Generic, config.generic_thread_count);

        Ok(Self {
            id: NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed),
            config,
            map,
            partition_runners,
            generic_runners,
            partition_threads,
            generic_threads,
            next_generic: AtomicUsize::new(0),
            lifecycle: Lifecycle::new(),
            handles: Mutex::new(Vec::new()),
            fatal_handler,
        })
    }

    // -- lifecycle ----------------------------------------------------------

    /// Spawns every operation thread. Calling it again while running is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Terminated` after shutdown, or
    /// `ExecutorError::Spawn` if the OS refuses a thread; in that case the
    /// threads already spawned are stopped and queued operations discarded.
    pub fn start(&self) -> Result<(), ExecutorError> {
        let mut handles = self.handles.lock();
        match self.lifecycle.state() {
            ExecutorState::Running => return Ok(()),
            ExecutorState::ShuttingDown | ExecutorState::Terminated => {
                return Err(ExecutorError::Terminated)
            }
            ExecutorState::Created => {}
        }

        for shared in &self.partition_threads {
            let resolver = PartitionRunnerResolver::new(
                Arc::clone(&self.partition_runners),
                self.map,
                shared.index,
            );
            let thread: PartitionOperationThread = self.operation_thread(shared, resolver);
            self.spawn_into(&mut handles, shared, thread)?;
        }
        for shared in &self.generic_threads {
            let resolver = GenericRunnerResolver::new(Arc::clone(&self.generic_runners), shared.index);
            let thread: GenericOperationThread = self.operation_thread(shared, resolver);
            self.spawn_into(&mut handles, shared, thread)?;
        }

        self.lifecycle.set(ExecutorState::Running);
        info!(
            partition_count = self.config.partition_count,
            partition_threads = self.partition_threads.len(),
            generic_threads = self.generic_threads.len(),
            "operation executor started"
        );
        Ok(())
    }

    fn operation_thread<R: RunnerResolver>(
        &self,
        shared: &Arc<ThreadShared>,
        resolver: R,
    ) -> OperationThread<R> {
        OperationThread::new(
            Arc::clone(shared),
            resolver,
            self.id,
            Arc::clone(&self.fatal_handler),
        )
    }

    fn spawn_into<R: RunnerResolver>(
        &self,
        handles: &mut Vec<JoinHandle<()>>,
        shared: &ThreadShared,
        thread: OperationThread<R>,
    ) -> Result<(), ExecutorError> {
        match thread.spawn() {
            Ok(handle) => {
                handles.push(handle);
                Ok(())
            }
            Err(source) => {
                error!(thread = %shared.name, error = %source, "failed to spawn operation thread");
                self.lifecycle.set(ExecutorState::ShuttingDown);
                self.stop_threads(handles, true);
                self.lifecycle.set(ExecutorState::Terminated);
                Err(ExecutorError::Spawn {
                    name: shared.name.clone(),
                    source,
                })
            }
        }
    }

    /// Stops every operation thread and blocks until all of them have exited.
    ///
    /// With `drain`, operations queued before the call run to completion
    /// first; without it they are failed with `OperationError::Discarded`.
    /// An executor that was never started has no threads to drain with, so
    /// its queued operations are always discarded. Later submissions are
    /// rejected with `QueueClosed`. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownFromOperationThread` when called from one of this
    /// executor's threads (joining would deadlock), and `ThreadFatal` when any
    /// operation thread died during the executor's life.
    pub fn shutdown(&self, drain: bool) -> Result<(), ExecutorError> {
        if self.is_operation_thread() {
            return Err(ExecutorError::ShutdownFromOperationThread);
        }

        let mut handles = self.handles.lock();
        let previous = self.lifecycle.state();
        if matches!(
            previous,
            ExecutorState::ShuttingDown | ExecutorState::Terminated
        ) {
            return Ok(());
        }

        self.lifecycle.set(ExecutorState::ShuttingDown);
        info!(drain, "shutting down operation executor");
        self.stop_threads(&mut handles, !drain || previous == ExecutorState::Created);
        self.lifecycle.set(ExecutorState::Terminated);

        let failed = self.failed_threads();
        if failed.is_empty() {
            info!("operation executor terminated");
            Ok(())
        } else {
            error!(failed = ?failed, "operation executor terminated with dead threads");
            Err(ExecutorError::ThreadFatal { threads: failed })
        }
    }

    fn stop_threads(&self, handles: &mut Vec<JoinHandle<()>>, discard: bool) {
        for shared in self.threads() {
            shared.begin_stopping();
            shared.queue.close();
        }

        if discard {
            let discarded: usize = self
                .threads()
                .map(|shared| fail_all(shared.queue.drain(), || OperationError::Discarded))
                .sum();
            if discarded > 0 {
                info!(discarded, "discarded queued operations");
            }
        }

        for handle in handles.drain(..) {
            let name = handle.thread().name().unwrap_or_default().to_string();
            if handle.join().is_err() {
                error!(thread = %name, "operation thread panicked outside its loop");
                if let Some(shared) = self.threads().find(|s| s.name == name) {
                    shared.mark_failed();
                }
            }
        }

        for shared in self.threads() {
            shared.mark_stopped_if_idle();
        }
    }

    /// Whether the executor has been started and not yet shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle.state() == ExecutorState::Running
    }

    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.lifecycle.state()
    }

    // -- submission ---------------------------------------------------------

    /// Queues `op` on the thread responsible for it.
    ///
    /// Partition operations always reach the same thread for the same
    /// partition. Urgent operations use the urgent lane.
    ///
    /// # Errors
    ///
    /// `QueueClosed` once shutdown has begun, `Overloaded` when a bounded
    /// normal lane is full, `InvalidPartition` for an out-of-range partition,
    /// and `ThreadFatal` when the owning thread has died. In every case the
    /// operation's sink also receives the matching failure.
    pub fn submit(&self, op: Operation) -> Result<(), ExecutorError> {
        let shared = match self.route(op.target()) {
            Ok(shared) => shared,
            Err(err) => {
                warn!(target = %op.target(), error = %err, "operation rejected");
                op.fail(err.to_operation_error());
                return Err(err);
            }
        };

        let urgent = op.is_urgent();
        match shared.queue.push(op, urgent) {
            Ok(()) => Ok(()),
            Err(PushError::Closed(op)) => {
                let err = if shared.state() == WorkerState::Failed {
                    ExecutorError::ThreadFatal {
                        threads: vec![shared.name.clone()],
                    }
                } else {
                    ExecutorError::QueueClosed
                };
                debug!(call_id = op.ctx().call_id, error = %err, "operation rejected");
                op.fail(err.to_operation_error());
                Err(err)
            }
            Err(PushError::Full(op)) => {
                let err = ExecutorError::Overloaded {
                    thread: shared.name.clone(),
                };
                warn!(call_id = op.ctx().call_id, thread = %shared.name, "normal lane full, operation rejected");
                op.fail(err.to_operation_error());
                Err(err)
            }
        }
    }

    fn route(&self, target: OperationTarget) -> Result<&ThreadShared, ExecutorError> {
        match target {
            OperationTarget::Partition(pid) => {
                let index = self
                    .partition_thread_index(pid)
                    .ok_or_else(|| self.invalid_partition(pid))?;
                Ok(&self.partition_threads[index])
            }
            OperationTarget::Generic => {
                let next = self.next_generic.fetch_add(1, Ordering::Relaxed);
                Ok(&self.generic_threads[next % self.generic_threads.len()])
            }
        }
    }

    fn invalid_partition(&self, partition_id: PartitionId) -> ExecutorError {
        ExecutorError::InvalidPartition {
            partition_id,
            partition_count: self.map.partition_count(),
        }
    }

    // -- synchronous fast path ----------------------------------------------

    /// Whether the calling thread is one of this executor's operation threads.
    #[must_use]
    pub fn is_operation_thread(&self) -> bool {
        current_worker().is_some_and(|worker| worker.executor_id == self.id)
    }

    /// Whether the calling thread is the partition thread owning
    /// `partition_id`, i.e. whether it may run that partition's runner
    /// directly.
    #[must_use]
    pub fn is_owner_thread(&self, partition_id: PartitionId) -> bool {
        current_worker().is_some_and(|worker| {
            worker.executor_id == self.id
                && worker.kind == ThreadKind::Partition
                && self.map.owns(worker.index, partition_id)
        })
    }

    /// Runs a partition operation directly on the calling thread, bypassing
    /// the queue. Only the owning partition thread may do this; enqueueing to
    /// its own queue and waiting would deadlock.
    ///
    /// # Errors
    ///
    /// `NotOwnerThread` (or `InvalidPartition`) when the calling thread does
    /// not own the operation's partition; the sink receives the same failure.
    pub fn run_on_calling_thread(&self, op: Operation) -> Result<(), ExecutorError> {
        let target = op.target();
        let runner = match target {
            OperationTarget::Partition(pid) if self.is_owner_thread(pid) => self.get_runner(pid),
            _ => None,
        };
        if let Some(runner) = runner {
            runner.run(op);
            return Ok(());
        }

        let err = match target {
            OperationTarget::Partition(pid) if !self.map.is_valid(pid) => {
                self.invalid_partition(pid)
            }
            _ => ExecutorError::NotOwnerThread { target },
        };
        op.fail(err.to_operation_error());
        Err(err)
    }

    /// Runs `op` inline when the calling thread owns its partition, and
    /// submits it otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit) when the operation is queued.
    pub fn run_or_submit(&self, op: Operation) -> Result<(), ExecutorError> {
        match op.target() {
            OperationTarget::Partition(pid) if self.is_owner_thread(pid) => {
                self.run_on_calling_thread(op)
            }
            _ => self.submit(op),
        }
    }

    // -- lookup -------------------------------------------------------------

    /// Index of the partition thread owning `partition_id`, or `None` if the
    /// partition is out of range.
    #[must_use]
    pub fn partition_thread_index(&self, partition_id: PartitionId) -> Option<usize> {
        self.map
            .is_valid(partition_id)
            .then(|| self.map.thread_for(partition_id))
    }

    /// The runner for `partition_id`.
    ///
    /// Only the owner thread may call `run` on it; see
    /// [`is_owner_thread`](Self::is_owner_thread).
    #[must_use]
    pub fn get_runner(&self, partition_id: PartitionId) -> Option<&OperationRunner> {
        self.partition_runners.get(partition_id as usize)
    }

    #[must_use]
    pub fn generic_runner(&self, index: usize) -> Option<&OperationRunner> {
        self.generic_runners.get(index)
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[must_use]
    pub fn partition_thread_map(&self) -> PartitionThreadMap {
        self.map
    }

    // -- health and metrics -------------------------------------------------

    fn threads(&self) -> impl Iterator<Item = &Arc<ThreadShared>> {
        self.partition_threads.iter().chain(&self.generic_threads)
    }

    /// Per-thread queue depth and progress, partition threads first.
    #[must_use]
    pub fn thread_stats(&self) -> Vec<ThreadStats> {
        self.threads().map(|shared| shared.stats()).collect()
    }

    /// Names of operation threads whose loop died.
    #[must_use]
    pub fn failed_threads(&self) -> Vec<String> {
        self.threads()
            .filter(|shared| shared.state() == WorkerState::Failed)
            .map(|shared| shared.name.clone())
            .collect()
    }

    #[must_use]
    pub fn health(&self) -> ExecutorHealth {
        ExecutorHealth {
            state: self.lifecycle.state(),
            failed_threads: self.failed_threads(),
            threads: self.thread_stats(),
        }
    }

    /// Publishes current queue depths through the `metrics` facade.
    pub fn report_metrics(&self) {
        publish_thread_stats(&self.thread_stats());
    }
}

impl Drop for OperationExecutor {
    fn drop(&mut self) {
        if self.lifecycle.state() == ExecutorState::Terminated {
            return;
        }
        match self.shutdown(self.config.queue_drain_on_shutdown) {
            Ok(()) => {}
            Err(ExecutorError::ShutdownFromOperationThread) => {
                // Dropped from one of our own threads: cannot join, but
                // closing the queues still lets every thread finish and exit.
                for shared in self.threads() {
                    shared.begin_stopping();
                    shared.queue.close();
                }
            }
            Err(err) => warn!(error = %err, "operation executor shutdown on drop failed"),
        }
    }
}

impl std::fmt::Debug for OperationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationExecutor")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .field("map", &self.map)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::operation::{OperationResponse, ResponseReceiver};

    fn executor(partitions: u32, partition_threads: usize, generic_threads: usize) -> OperationExecutor {
        OperationExecutor::new(ExecutorConfig {
            thread_name_prefix: "test".to_string(),
            ..ExecutorConfig::with_threads(partitions, partition_threads, generic_threads)
        })
        .unwrap()
    }

    fn empty(target: OperationTarget) -> (Operation, ResponseReceiver) {
        Operation::with_reply(target, |_| Ok(OperationResponse::Empty))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = OperationExecutor::new(ExecutorConfig::with_threads(0, 1, 1)).unwrap_err();
        assert!(matches!(err, ExecutorError::Config(ConfigError::ZeroPartitions)));
    }

    #[test]
    fn partition_thread_index_is_modulo() {
        let exec = executor(8, 3, 1);
        assert_eq!(exec.partition_thread_index(0), Some(0));
        assert_eq!(exec.partition_thread_index(4), Some(1));
        assert_eq!(exec.partition_thread_index(7), Some(1));
        assert_eq!(exec.partition_thread_index(8), None);
    }

    #[test]
    fn runners_are_indexed_by_partition() {
        let exec = executor(4, 2, 2);
        assert_eq!(exec.get_runner(3).unwrap().kind(), RunnerKind::Partition(3));
        assert!(exec.get_runner(4).is_none());
        assert_eq!(exec.generic_runner(1).unwrap().kind(), RunnerKind::Generic(1));
        assert!(exec.generic_runner(2).is_none());
    }

    #[test]
    fn start_is_idempotent_and_shutdown_runs_once() {
        let exec = executor(4, 2, 1);
        assert_eq!(exec.state(), ExecutorState::Created);
        exec.start().unwrap();
        exec.start().unwrap();
        assert!(exec.is_running());
        assert_eq!(exec.thread_stats().len(), 3);

        exec.shutdown(true).unwrap();
        exec.shutdown(true).unwrap();
        assert_eq!(exec.state(), ExecutorState::Terminated);
        assert!(!exec.is_running());
        assert!(exec
            .thread_stats()
            .iter()
            .all(|stats| stats.state == WorkerState::Stopped));
        assert!(matches!(exec.start(), Err(ExecutorError::Terminated)));
    }

    #[test]
    fn submit_after_shutdown_reports_queue_closed() {
        let exec = executor(4, 2, 1);
        exec.start().unwrap();
        exec.shutdown(true).unwrap();

        let (op, rx) = empty(OperationTarget::Partition(1));
        assert!(matches!(exec.submit(op), Err(ExecutorError::QueueClosed)));
        assert!(matches!(
            rx.blocking_recv().unwrap(),
            Err(OperationError::QueueClosed)
        ));
    }

    #[test]
    fn out_of_range_partition_is_rejected() {
        let exec = executor(4, 2, 1);
        let (op, rx) = empty(OperationTarget::Partition(4));
        assert!(matches!(
            exec.submit(op),
            Err(ExecutorError::InvalidPartition { partition_id: 4, partition_count: 4 })
        ));
        assert!(matches!(
            rx.blocking_recv().unwrap(),
            Err(OperationError::InvalidPartition { .. })
        ));
    }

    #[test]
    fn operations_submitted_before_start_run_after_start() {
        let exec = executor(4, 2, 1);
        let (op, rx) = empty(OperationTarget::Partition(2));
        exec.submit(op).unwrap();
        exec.start().unwrap();
        assert!(rx.blocking_recv().unwrap().is_ok());
        exec.shutdown(true).unwrap();
    }

    #[test]
    fn shutdown_before_start_discards_queued_work() {
        let exec = executor(4, 2, 1);
        let (op, rx) = empty(OperationTarget::Generic);
        exec.submit(op).unwrap();
        exec.shutdown(true).unwrap();
        assert!(matches!(
            rx.blocking_recv().unwrap(),
            Err(OperationError::Discarded)
        ));
    }

    #[test]
    fn generic_operations_round_robin() {
        let exec = executor(2, 1, 3);
        for _ in 0..6 {
            let (op, _rx) = empty(OperationTarget::Generic);
            exec.submit(op).unwrap();
        }
        let generic: Vec<usize> = exec
            .thread_stats()
            .iter()
            .filter(|stats| stats.kind == ThreadKind::Generic)
            .map(ThreadStats::queue_depth)
            .collect();
        assert_eq!(generic, vec![2, 2, 2]);
    }

    #[test]
    fn bounded_normal_lane_overloads_but_urgent_passes() {
        let exec = OperationExecutor::new(ExecutorConfig {
            queue_capacity: Some(1),
            ..ExecutorConfig::with_threads(2, 1, 1)
        })
        .unwrap();

        let (first, _first_rx) = empty(OperationTarget::Partition(0));
        exec.submit(first).unwrap();
        let (second, second_rx) = empty(OperationTarget::Partition(1));
        assert!(matches!(
            exec.submit(second),
            Err(ExecutorError::Overloaded { .. })
        ));
        assert!(matches!(
            second_rx.blocking_recv().unwrap(),
            Err(OperationError::Overloaded { .. })
        ));
        let (urgent, _urgent_rx) = empty(OperationTarget::Partition(1));
        exec.submit(urgent.urgent()).unwrap();
    }

    #[test]
    fn fast_path_is_rejected_off_the_owner_thread() {
        let exec = executor(4, 2, 1);
        assert!(!exec.is_operation_thread());
        assert!(!exec.is_owner_thread(0));

        let (op, rx) = empty(OperationTarget::Partition(0));
        assert!(matches!(
            exec.run_on_calling_thread(op),
            Err(ExecutorError::NotOwnerThread { .. })
        ));
        assert!(matches!(
            rx.blocking_recv().unwrap(),
            Err(OperationError::NotOwnerThread { .. })
        ));
    }

    #[test]
    fn owner_thread_runs_sibling_partition_inline() {
        let exec = Arc::new(executor(4, 2, 1));
        exec.start().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let inner_exec = Arc::clone(&exec);
        let (op, rx) = Operation::with_reply(OperationTarget::Partition(0), move |_| {
            // Partition 2 shares thread 0 with partition 0.
            let owner = inner_exec.is_owner_thread(2);
            let not_owner = inner_exec.is_owner_thread(1);
            let (sibling, sibling_rx) = Operation::with_reply(OperationTarget::Partition(2), |ctx| {
                Ok(OperationResponse::Ack {
                    call_id: ctx.call_id(),
                })
            });
            inner_exec.run_or_submit(sibling)?;
            let inline = sibling_rx.blocking_recv()?.is_ok();
            done_tx.send((owner, not_owner, inline))?;
            Ok(OperationResponse::Empty)
        });
        exec.submit(op).unwrap();
        assert!(rx.blocking_recv().unwrap().is_ok());
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (true, false, true)
        );
        exec.shutdown(true).unwrap();
    }

    #[test]
    fn shutdown_from_operation_thread_is_rejected() {
        let exec = Arc::new(executor(2, 1, 1));
        exec.start().unwrap();
        let inner_exec = Arc::clone(&exec);
        let (op, rx) = Operation::with_reply(OperationTarget::Generic, move |_| {
            match inner_exec.shutdown(true) {
                Err(ExecutorError::ShutdownFromOperationThread) => Ok(OperationResponse::Empty),
                other => Err(anyhow::anyhow!("unexpected: {other:?}")),
            }
        });
        exec.submit(op).unwrap();
        assert!(rx.blocking_recv().unwrap().is_ok());
        exec.shutdown(true).unwrap();
    }

    #[test]
    fn drop_drains_by_default() {
        let exec = executor(2, 1, 1);
        exec.start().unwrap();
        let (op, rx) = empty(OperationTarget::Partition(1));
        exec.submit(op).unwrap();
        drop(exec);
        assert!(rx.blocking_recv().unwrap().is_ok());
    }

    #[test]
    fn health_reports_running_threads() {
        let exec = executor(4, 2, 2);
        exec.start().unwrap();
        let health = exec.health();
        assert!(health.is_healthy());
        assert_eq!(health.threads.len(), 4);
        assert_eq!(health.threads[0].name, "test.partition-operation.thread-0");
        assert_eq!(health.threads[3].name, "test.generic-operation.thread-1");
        exec.report_metrics();
        exec.shutdown(false).unwrap();
        assert!(!exec.health().is_healthy());
    }
}
