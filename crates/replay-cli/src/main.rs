//! Snapshot-log CLI: summarize stored snapshots and recover a match's clocks.

#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use clock_core::{SystemTimeSource, TimeSource, Timestamp};
use serde_json::{json, Value};
use snapshot_log::{format_timestamp, parse_timestamp, JsonlSnapshotLog, WireAnySnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timecontrol::{create_clock_pair, ClockEnv, EngineConfig, ManualScheduler, SafetyOptions};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clock-replay", about = "Inspect clock snapshots and replay lost time")]
struct Cli {
    /// Emit JSON logs to stderr (filter with RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show per-match counts and the recorded time range of a snapshot log
    Inspect {
        #[arg(short, long)]
        log: PathBuf,
        #[arg(short, long)]
        match_id: Option<String>,
    },
    /// Restore the latest snapshot of a match as of a given instant
    Restore {
        #[arg(short, long)]
        log: PathBuf,
        #[arg(short, long)]
        match_id: String,
        /// RFC 3339 instant to replay up to (defaults to now)
        #[arg(long)]
        at: Option<String>,
        /// YAML engine config; falls back to TIMECONTROL_* variables
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.verbose {
        telemetry::init_json_logging();
    }
    let out = match cli.cmd {
        Command::Inspect { log, match_id } => cmd_inspect(&log, match_id.as_deref())?,
        Command::Restore { log, match_id, at, config } => {
            let at = match at {
                Some(raw) => parse_timestamp(&raw)?,
                None => SystemTimeSource.now(),
            };
            let config = match config {
                Some(path) => EngineConfig::load_from_yaml_path(path)?,
                None => EngineConfig::from_env()?,
            };
            cmd_restore(&log, &match_id, at, &config.safety)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_inspect(log: &Path, match_id: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    let log = JsonlSnapshotLog::open(log)?;
    let mut recs = log.read_all()?;
    if let Some(m) = match_id {
        recs.retain(|r| r.match_id == m);
    }
    let mut by_match = BTreeMap::<&str, usize>::new();
    let mut by_state = BTreeMap::<String, usize>::new();
    for rec in &recs {
        *by_match.entry(rec.match_id.as_str()).or_default() += 1;
        *by_state.entry(rec.snapshot.decode()?.state().to_string()).or_default() += 1;
    }
    Ok(json!({
        "total": recs.len(),
        "first_id": recs.first().map(|r| r.id),
        "last_id": recs.last().map(|r| r.id),
        "first_recorded_at": recs.first().map(|r| r.recorded_at.as_str()),
        "last_recorded_at": recs.last().map(|r| r.recorded_at.as_str()),
        "by_match": by_match,
        "by_state": by_state,
    }))
}

fn cmd_restore(
    log: &Path,
    match_id: &str,
    at: Timestamp,
    safety: &SafetyOptions,
) -> Result<Value, Box<dyn std::error::Error>> {
    let log = JsonlSnapshotLog::open(log)?;
    let rec = log.latest(match_id)?.ok_or_else(|| format!("no snapshot for match {match_id:?}"))?;
    let snapshot = rec.decode()?;

    // Timers never fire here, so only elapses replayed up to `at` show up.
    let env = ClockEnv::new(Arc::new(ManualScheduler::new()), Arc::new(SystemTimeSource));
    let (mut pair, mut rx) = create_clock_pair(&rec.time_control, None, Some(safety), &env)?;
    pair.restore_at(&snapshot, at)?;
    let signalled = rx.try_recv().ok();
    info!(match_id, record = rec.id, state = %pair.state(), "snapshot restored");

    let elapsed = match pair.elapsed() {
        Some(r) => json!({ "side": r.side, "at": format_timestamp(r.at)?, "signalled": signalled.is_some() }),
        None => Value::Null,
    };
    Ok(json!({
        "match_id": match_id,
        "record_id": rec.id,
        "recorded_at": rec.recorded_at,
        "restored_at": format_timestamp(at)?,
        "time_control": rec.time_control,
        "snapshot": WireAnySnapshot::encode(&pair.snapshot())?,
        "elapsed": elapsed,
        "metrics": env.metrics.snapshot(),
    }))
}
