use std::num::NonZeroUsize;

use gridexec_core::PARTITION_COUNT;
use serde::{Deserialize, Serialize};

/// Configuration for the partitioned operation executor.
///
/// Thread counts are fixed for the executor's lifetime; changing them
/// requires building a new executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of partitions. Must match the grid's fixed partition count;
    /// defaults to `gridexec_core::PARTITION_COUNT` (271).
    pub partition_count: u32,
    /// Number of partition operation threads. Partitions are assigned to
    /// threads by `partition_id mod partition_thread_count`.
    pub partition_thread_count: usize,
    /// Number of generic operation threads (and generic runners).
    pub generic_thread_count: usize,
    /// Whether `Drop` drains queued operations (run them) instead of
    /// failing them with `OperationError::Discarded`.
    pub queue_drain_on_shutdown: bool,
    /// Whether runners fail operations whose deadline passed before execution.
    pub operation_deadline_check_enabled: bool,
    /// Optional bound on each thread's normal lane. `None` means unbounded.
    /// The urgent lane is never bounded.
    pub queue_capacity: Option<usize>,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(2);
        Self {
            partition_count: PARTITION_COUNT,
            partition_thread_count: cores.max(2),
            generic_thread_count: (cores / 2).max(2),
            queue_drain_on_shutdown: true,
            operation_deadline_check_enabled: true,
            queue_capacity: None,
            thread_name_prefix: "gridexec".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Configuration with explicit counts and defaults for everything else.
    #[must_use]
    pub fn with_threads(
        partition_count: u32,
        partition_thread_count: usize,
        generic_thread_count: usize,
    ) -> Self {
        Self {
            partition_count,
            partition_thread_count,
            generic_thread_count,
            ..Self::default()
        }
    }

    /// Checks the configuration for values the executor cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 {
            return Err(ConfigError::ZeroPartitions);
        }
        if self.partition_thread_count == 0 {
            return Err(ConfigError::ZeroThreads {
                kind: "partition_thread_count",
            });
        }
        if self.generic_thread_count == 0 {
            return Err(ConfigError::ZeroThreads {
                kind: "generic_thread_count",
            });
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Invalid executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("partition_count must be greater than zero")]
    ZeroPartitions,
    #[error("{kind} must be greater than zero")]
    ZeroThreads { kind: &'static str },
    #[error("queue_capacity must be greater than zero when set")]
    ZeroCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExecutorConfig::default();
        assert_eq!(config.partition_count, 271);
        assert!(config.partition_thread_count >= 2);
        assert!(config.generic_thread_count >= 2);
        assert!(config.queue_drain_on_shutdown);
        assert!(config.operation_deadline_check_enabled);
        assert!(config.queue_capacity.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert_eq!(
            ExecutorConfig::with_threads(0, 2, 2).validate(),
            Err(ConfigError::ZeroPartitions)
        );
        assert!(matches!(
            ExecutorConfig::with_threads(4, 0, 2).validate(),
            Err(ConfigError::ZeroThreads { kind: "partition_thread_count" })
        ));
        assert!(matches!(
            ExecutorConfig::with_threads(4, 2, 0).validate(),
            Err(ConfigError::ZeroThreads { kind: "generic_thread_count" })
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ExecutorConfig {
            queue_capacity: Some(0),
            ..ExecutorConfig::with_threads(4, 2, 1)
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"partition_count": 8, "queue_drain_on_shutdown": false}"#)
                .unwrap();
        assert_eq!(config.partition_count, 8);
        assert!(!config.queue_drain_on_shutdown);
        assert_eq!(config.thread_name_prefix, "gridexec");
    }
}
