//! Append-only JSONL log of clock-pair snapshots, keyed by match.
//!
//! Each line is one [`SnapshotRecord`]: the match id, when the snapshot was
//! taken, the time control the pair was built with, and the snapshot in wire
//! form. Replaying a match means building a pair from the stored time control
//! and restoring the latest snapshot against the current time.

#![deny(unsafe_code)]

pub mod wire;

use clock_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use timecontrol::{AnySnapshot, TimeControl};
use tracing::debug;
pub use wire::{format_timestamp, parse_timestamp, WireAnySnapshot};

#[derive(Debug, Error)]
pub enum SnapshotLogError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("timestamp: {0}")]
    Timestamp(String),
    #[error("record {id}: snapshot is {found} but time control is {expected}")]
    FamilyMismatch { id: u64, expected: timecontrol::FamilyKind, found: timecontrol::FamilyKind },
}

/// One persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Position in the log, starting at 1.
    pub id: u64,
    pub match_id: String,
    /// RFC 3339 instant the snapshot was taken.
    pub recorded_at: String,
    pub time_control: TimeControl,
    pub snapshot: WireAnySnapshot,
}

impl SnapshotRecord {
    pub fn recorded_at(&self) -> Result<Timestamp, SnapshotLogError> {
        parse_timestamp(&self.recorded_at)
    }

    /// Decode the snapshot, checking it belongs to the stored time control.
    pub fn decode(&self) -> Result<AnySnapshot, SnapshotLogError> {
        let snapshot = self.snapshot.decode()?;
        if snapshot.kind() != self.time_control.kind() {
            return Err(SnapshotLogError::FamilyMismatch {
                id: self.id,
                expected: self.time_control.kind(),
                found: snapshot.kind(),
            });
        }
        Ok(snapshot)
    }
}

/// JSONL-backed snapshot store. Clones share the id counter.
#[derive(Debug, Clone)]
pub struct JsonlSnapshotLog {
    path: PathBuf,
    next_id: Arc<AtomicU64>,
}

impl JsonlSnapshotLog {
    /// Create or open a log at `path`; ids continue after the last stored record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotLogError> {
        let p = path.as_ref();
        if !p.exists() {
            OpenOptions::new().create(true).write(true).truncate(true).open(p)?;
        }
        let log = Self { path: p.to_path_buf(), next_id: Arc::new(AtomicU64::new(1)) };
        let last = log.read_all()?.last().map_or(0, |r| r.id);
        log.next_id.store(last + 1, Ordering::SeqCst);
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a snapshot of `match_id`; returns the assigned id.
    pub fn append(
        &self,
        match_id: &str,
        recorded_at: Timestamp,
        time_control: &TimeControl,
        snapshot: &AnySnapshot,
    ) -> Result<u64, SnapshotLogError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rec = SnapshotRecord {
            id,
            match_id: match_id.to_owned(),
            recorded_at: format_timestamp(recorded_at)?,
            time_control: *time_control,
            snapshot: WireAnySnapshot::encode(snapshot)?,
        };
        let line = serde_json::to_string(&rec)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        debug!(id, match_id, state = %snapshot.state(), "snapshot appended");
        Ok(id)
    }

    pub fn read_all(&self) -> Result<Vec<SnapshotRecord>, SnapshotLogError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    pub fn for_match(&self, match_id: &str) -> Result<Vec<SnapshotRecord>, SnapshotLogError> {
        let mut recs = self.read_all()?;
        recs.retain(|r| r.match_id == match_id);
        Ok(recs)
    }

    /// Most recently appended snapshot of `match_id`.
    pub fn latest(&self, match_id: &str) -> Result<Option<SnapshotRecord>, SnapshotLogError> {
        Ok(self.for_match(match_id)?.pop())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use clock_core::{ClockValue, Side};
    use timecontrol::{IncrementOptions, PairState, Snapshot};

    fn snap(ms: u64) -> AnySnapshot {
        AnySnapshot::Increment(Snapshot {
            state: PairState::Paused,
            side_to_move: Side::First,
            players: [ClockValue::frozen(ms), ClockValue::frozen(ms)],
            elapsed_at: None,
        })
    }

    #[test]
    fn append_assigns_increasing_ids_across_reopen() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let tc = TimeControl::Increment(IncrementOptions::new(1_000));
        let log = JsonlSnapshotLog::open(tmp.path()).unwrap();
        assert_eq!(log.append("m1", Timestamp::from_millis(5), &tc, &snap(1)).unwrap(), 1);
        assert_eq!(log.append("m1", Timestamp::from_millis(6), &tc, &snap(2)).unwrap(), 2);
        let reopened = JsonlSnapshotLog::open(tmp.path()).unwrap();
        assert_eq!(reopened.append("m2", Timestamp::from_millis(7), &tc, &snap(3)).unwrap(), 3);
    }

    #[test]
    fn decode_rejects_family_mismatch() {
        let rec = SnapshotRecord {
            id: 9,
            match_id: "m".into(),
            recorded_at: "1970-01-01T00:00:00Z".into(),
            time_control: TimeControl::PeriodBank(timecontrol::PeriodBankOptions::new(0, 1, 1)),
            snapshot: WireAnySnapshot::encode(&snap(1)).unwrap(),
        };
        assert!(matches!(rec.decode(), Err(SnapshotLogError::FamilyMismatch { id: 9, .. })));
    }
}
