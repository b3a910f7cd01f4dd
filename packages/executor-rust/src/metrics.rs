//! Queue-depth and outcome reporting through the `metrics` facade.
//!
//! The executor only emits; installing a recorder (Prometheus exporter or
//! similar) is up to the hosting process. Without a recorder every call here
//! is a no-op.

use serde::Serialize;

use crate::thread::{ThreadKind, WorkerState};

/// Point-in-time view of one operation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadStats {
    pub name: String,
    pub kind: ThreadKind,
    pub index: usize,
    pub state: WorkerState,
    pub urgent_depth: usize,
    pub normal_depth: usize,
    pub processed: u64,
}

impl ThreadStats {
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.urgent_depth + self.normal_depth
    }
}

/// Publishes per-thread queue depth and processed-count gauges.
#[allow(clippy::cast_precision_loss)]
pub fn publish_thread_stats(stats: &[ThreadStats]) {
    for s in stats {
        metrics::gauge!("gridexec_queue_depth", "thread" => s.name.clone(), "lane" => "urgent")
            .set(s.urgent_depth as f64);
        metrics::gauge!("gridexec_queue_depth", "thread" => s.name.clone(), "lane" => "normal")
            .set(s.normal_depth as f64);
        metrics::gauge!("gridexec_thread_processed", "thread" => s.name.clone())
            .set(s.processed as f64);
    }
}

/// Counts one operation outcome for a runner kind.
pub(crate) fn record_outcome(kind: &'static str, outcome: &'static str) {
    metrics::counter!("gridexec_operations_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}
