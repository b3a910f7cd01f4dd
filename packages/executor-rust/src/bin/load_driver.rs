//! Load driver for the operation executor.
//!
//! Builds an executor from a JSON config file (and/or flags), pushes a
//! synthetic key-value workload through it, shuts it down, and prints the
//! final health snapshot as JSON on stdout.
//!
//! Usage:
//!   load-driver --operations 100000 --partition-threads 8
//!   GRIDEXEC_CONFIG=executor.json RUST_LOG=debug load-driver --log-format json

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gridexec_core::Value;
use gridexec_executor::{
    callback, ExecutorConfig, ExecutorHealth, Operation, OperationExecutor, OperationResponse,
    OperationTarget,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "load-driver", about = "Drive a synthetic workload through the operation executor")]
struct Args {
    /// JSON file with an `ExecutorConfig`; flags below override its fields.
    #[arg(long, env = "GRIDEXEC_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    partition_count: Option<u32>,

    #[arg(long)]
    partition_threads: Option<usize>,

    #[arg(long)]
    generic_threads: Option<usize>,

    /// Total operations to submit.
    #[arg(long, default_value_t = 10_000)]
    operations: u64,

    /// Every n-th operation is urgent (0 disables).
    #[arg(long, default_value_t = 100)]
    urgent_every: u64,

    /// Every n-th operation is generic instead of partition-bound (0 disables).
    #[arg(long, default_value_t = 50)]
    generic_every: u64,

    /// Fail queued operations at shutdown instead of running them.
    #[arg(long)]
    discard_on_shutdown: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Default)]
struct Tally {
    ok: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Serialize)]
struct Report {
    submitted: u64,
    rejected: u64,
    completed_ok: u64,
    completed_err: u64,
    elapsed_ms: u64,
    health: ExecutorHealth,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ExecutorConfig> {
    let Some(path) = path else {
        return Ok(ExecutorConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn apply_overrides(mut config: ExecutorConfig, args: &Args) -> ExecutorConfig {
    if let Some(count) = args.partition_count {
        config.partition_count = count;
    }
    if let Some(count) = args.partition_threads {
        config.partition_thread_count = count;
    }
    if let Some(count) = args.generic_threads {
        config.generic_thread_count = count;
    }
    config
}

fn every(n: u64, i: u64) -> bool {
    n != 0 && i % n == n - 1
}

/// Builds operation `i` of the workload: partition operations bump a
/// per-partition counter, generic ones just acknowledge.
fn workload_operation(i: u64, args: &Args, partition_count: u32, tally: &Arc<Tally>) -> Operation {
    let target = if every(args.generic_every, i) {
        OperationTarget::Generic
    } else {
        OperationTarget::for_key(format!("key-{i}").as_bytes(), partition_count)
    };

    let sink_tally = Arc::clone(tally);
    let op = Operation::new(
        target,
        |ctx| {
            if ctx.partition_id().is_none() {
                return Ok(OperationResponse::Ack {
                    call_id: ctx.call_id(),
                });
            }
            let counter = ctx.state_mut().get_or_insert_with("ops", || Value::Int(0));
            if let Value::Int(n) = &mut *counter {
                *n += 1;
            }
            Ok(OperationResponse::Value(counter.clone()))
        },
        callback(move |result| {
            let slot = if result.is_ok() {
                &sink_tally.ok
            } else {
                &sink_tally.failed
            };
            slot.fetch_add(1, Ordering::Relaxed);
        }),
    );

    if every(args.urgent_every, i) {
        op.urgent()
    } else {
        op
    }
}

fn run(args: &Args) -> anyhow::Result<Report> {
    let config = apply_overrides(load_config(args.config.as_deref())?, args);
    let partition_count = config.partition_count;
    info!(?config, operations = args.operations, "starting load driver");

    let executor = OperationExecutor::new(config)?;
    executor.start()?;

    let tally = Arc::new(Tally::default());
    let started = Instant::now();
    let mut rejected = 0_u64;
    for i in 0..args.operations {
        let op = workload_operation(i, args, partition_count, &tally);
        if let Err(err) = executor.submit(op) {
            rejected += 1;
            warn!(error = %err, "submission rejected");
        }
    }
    executor.report_metrics();

    if let Err(err) = executor.shutdown(!args.discard_on_shutdown) {
        warn!(error = %err, "executor shut down with errors");
    }

    Ok(Report {
        submitted: args.operations,
        rejected,
        completed_ok: tally.ok.load(Ordering::Relaxed),
        completed_err: tally.failed.load(Ordering::Relaxed),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        health: executor.health(),
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let report = run(&args)?;
    info!(
        ok = report.completed_ok,
        failed = report.completed_err,
        elapsed_ms = report.elapsed_ms,
        "load driver finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["load-driver"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn config_file_is_merged_with_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"partition_count": 16, "partition_thread_count": 3, "thread_name_prefix": "bench"}}"#
        )
        .unwrap();

        let args = args(&["--generic-threads", "5", "--partition-threads", "4"]);
        let config = apply_overrides(load_config(Some(file.path())).unwrap(), &args);
        assert_eq!(config.partition_count, 16);
        assert_eq!(config.partition_thread_count, 4);
        assert_eq!(config.generic_thread_count, 5);
        assert_eq!(config.thread_name_prefix, "bench");
        assert!(config.queue_drain_on_shutdown);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }

    #[test]
    fn every_selects_last_of_each_group() {
        assert!(!every(0, 0));
        assert!(every(1, 0));
        assert!(!every(3, 0));
        assert!(every(3, 2));
        assert!(every(3, 5));
    }

    #[test]
    fn drained_run_completes_every_operation() {
        let args = args(&[
            "--partition-count",
            "8",
            "--partition-threads",
            "2",
            "--generic-threads",
            "2",
            "--operations",
            "500",
            "--urgent-every",
            "7",
            "--generic-every",
            "10",
        ]);
        let report = run(&args).unwrap();
        assert_eq!(report.rejected, 0);
        assert_eq!(report.completed_ok, 500);
        assert_eq!(report.completed_err, 0);
        assert!(report.health.failed_threads.is_empty());
    }
}
