//! Executor lifecycle state.
//!
//! Uses `ArcSwap` so health probes and submitters read the state lock-free
//! while `start`/`shutdown` transition it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::metrics::ThreadStats;

/// Executor lifecycle state.
///
/// State machine: Created -> Running -> `ShuttingDown` -> Terminated.
/// `Created` may also go straight to `ShuttingDown` if the executor is shut
/// down without ever being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    /// Built, threads not yet spawned. Submissions are queued.
    Created,
    /// All operation threads are running.
    Running,
    /// Shutdown in progress; new submissions are rejected.
    ShuttingDown,
    /// Every operation thread has exited.
    Terminated,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: ArcSwap<ExecutorState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(ExecutorState::Created),
        }
    }

    pub(crate) fn state(&self) -> ExecutorState {
        **self.state.load()
    }

    pub(crate) fn set(&self, state: ExecutorState) {
        self.state.store(Arc::new(state));
    }
}

/// Health snapshot handed to an external observability collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorHealth {
    pub state: ExecutorState,
    pub failed_threads: Vec<String>,
    pub threads: Vec<ThreadStats>,
}

impl ExecutorHealth {
    /// Running with every thread alive.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == ExecutorState::Running && self.failed_threads.is_empty()
    }

    /// Sum of queued operations across all threads.
    #[must_use]
    pub fn total_queue_depth(&self) -> usize {
        self.threads.iter().map(ThreadStats::queue_depth).sum()
    }
}
