//! Family selection by tag, type-erased pairs, and rehydration.

use crate::byoyomi::{PeriodBankFamily, PeriodBankOptions, PeriodBankPlayer};
use crate::config::{process_safety, SafetyOptions};
use crate::error::{ClockResult, InvalidTransition};
use crate::increment::{IncrementFamily, IncrementOptions};
use crate::pair::{
    ClockEnv, ClockPair, ElapsedReceiver, ElapsedRecord, FamilyKind, PairState, Snapshot,
};
use clock_core::{ClockValue, Side, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Family tag plus options, as stored per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TimeControl {
    Increment(IncrementOptions),
    PeriodBank(PeriodBankOptions),
}

impl TimeControl {
    pub fn kind(&self) -> FamilyKind {
        match self {
            TimeControl::Increment(_) => FamilyKind::Increment,
            TimeControl::PeriodBank(_) => FamilyKind::PeriodBank,
        }
    }
}

/// Snapshot of either family, tagged the same way as [`TimeControl`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum AnySnapshot {
    Increment(Snapshot<ClockValue>),
    PeriodBank(Snapshot<PeriodBankPlayer>),
}

impl AnySnapshot {
    pub fn kind(&self) -> FamilyKind {
        match self {
            AnySnapshot::Increment(_) => FamilyKind::Increment,
            AnySnapshot::PeriodBank(_) => FamilyKind::PeriodBank,
        }
    }

    pub fn state(&self) -> PairState {
        match self {
            AnySnapshot::Increment(s) => s.state,
            AnySnapshot::PeriodBank(s) => s.state,
        }
    }

    pub fn side_to_move(&self) -> Side {
        match self {
            AnySnapshot::Increment(s) => s.side_to_move,
            AnySnapshot::PeriodBank(s) => s.side_to_move,
        }
    }
}

impl From<Snapshot<ClockValue>> for AnySnapshot {
    fn from(s: Snapshot<ClockValue>) -> Self {
        AnySnapshot::Increment(s)
    }
}

impl From<Snapshot<PeriodBankPlayer>> for AnySnapshot {
    fn from(s: Snapshot<PeriodBankPlayer>) -> Self {
        AnySnapshot::PeriodBank(s)
    }
}

/// A pair of either family, for callers that store pairs without generics.
#[derive(Debug)]
pub enum AnyClockPair {
    Increment(ClockPair<IncrementFamily>),
    PeriodBank(ClockPair<PeriodBankFamily>),
}

macro_rules! dispatch {
    ($self:expr, $pair:ident => $body:expr) => {
        match $self {
            AnyClockPair::Increment($pair) => $body,
            AnyClockPair::PeriodBank($pair) => $body,
        }
    };
}

impl AnyClockPair {
    pub fn kind(&self) -> FamilyKind {
        dispatch!(self, p => p.kind())
    }

    pub fn state(&self) -> PairState {
        dispatch!(self, p => p.state())
    }

    pub fn side_to_move(&self) -> Side {
        dispatch!(self, p => p.side_to_move())
    }

    pub fn elapsed(&self) -> Option<ElapsedRecord> {
        dispatch!(self, p => p.elapsed())
    }

    pub fn start(&mut self, at: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.start(at))
    }

    pub fn pause(&mut self, at: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.pause(at))
    }

    pub fn start_at(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.start_at(at, now))
    }

    pub fn resume(&mut self, at: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.resume(at))
    }

    pub fn resume_at(&mut self, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.resume_at(at, now))
    }

    pub fn push(&mut self, side: Side, at: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.push(side, at))
    }

    pub fn push_at(&mut self, side: Side, at: Timestamp, now: Timestamp) -> ClockResult<()> {
        dispatch!(self, p => p.push_at(side, at, now))
    }

    pub fn finish(&mut self, at: Timestamp) {
        dispatch!(self, p => p.finish(at));
    }

    pub fn strict_elapsed_side(&self) -> Result<Side, InvalidTransition> {
        dispatch!(self, p => p.strict_elapsed_side())
    }

    pub fn strict_elapsed_at(&self) -> Result<Timestamp, InvalidTransition> {
        dispatch!(self, p => p.strict_elapsed_at())
    }

    pub fn remaining(&self, side: Side) -> i64 {
        dispatch!(self, p => p.remaining(side))
    }

    pub fn total_remaining(&self, side: Side) -> i64 {
        dispatch!(self, p => p.total_remaining(side))
    }

    /// Banked periods of `side`; `None` for the increment family.
    pub fn remaining_periods(&self, side: Side) -> Option<u32> {
        match self {
            AnyClockPair::Increment(_) => None,
            AnyClockPair::PeriodBank(p) => Some(p.remaining_periods(side)),
        }
    }

    pub fn snapshot(&self) -> AnySnapshot {
        dispatch!(self, p => p.snapshot().into())
    }

    /// Restore a snapshot of the same family.
    pub fn restore(&mut self, snapshot: &AnySnapshot) -> ClockResult<()> {
        self.restore_as_of(snapshot, None)
    }

    /// [`restore`](Self::restore) as of an explicit `now`.
    pub fn restore_at(&mut self, snapshot: &AnySnapshot, now: Timestamp) -> ClockResult<()> {
        self.restore_as_of(snapshot, Some(now))
    }

    fn restore_as_of(&mut self, snapshot: &AnySnapshot, now: Option<Timestamp>) -> ClockResult<()> {
        match (self, snapshot, now) {
            (AnyClockPair::Increment(p), AnySnapshot::Increment(s), Some(now)) => {
                p.restore_at(s, now)
            }
            (AnyClockPair::Increment(p), AnySnapshot::Increment(s), None) => p.restore(s),
            (AnyClockPair::PeriodBank(p), AnySnapshot::PeriodBank(s), Some(now)) => {
                p.restore_at(s, now)
            }
            (AnyClockPair::PeriodBank(p), AnySnapshot::PeriodBank(s), None) => p.restore(s),
            (pair, snapshot, _) => Err(InvalidTransition::FamilyMismatch {
                expected: pair.kind(),
                found: snapshot.kind(),
            }
            .into()),
        }
    }
}

/// Build the pair for `control`, then restore `snapshot` if one is given.
///
/// `safety` defaults to the process-wide options. Restoring may elapse the
/// pair before this returns; the record is then already in the receiver.
pub fn create_clock_pair(
    control: &TimeControl,
    snapshot: Option<&AnySnapshot>,
    safety: Option<&SafetyOptions>,
    env: &ClockEnv,
) -> ClockResult<(AnyClockPair, ElapsedReceiver)> {
    if let Some(s) = snapshot {
        if s.kind() != control.kind() {
            return Err(InvalidTransition::FamilyMismatch {
                expected: control.kind(),
                found: s.kind(),
            }
            .into());
        }
    }
    let safety = safety.copied().unwrap_or_else(process_safety);
    let (mut pair, rx) = match *control {
        TimeControl::Increment(options) => {
            let (p, rx) = ClockPair::<IncrementFamily>::create(options, &safety, env)?;
            (AnyClockPair::Increment(p), rx)
        }
        TimeControl::PeriodBank(options) => {
            let (p, rx) = ClockPair::<PeriodBankFamily>::create(options, env)?;
            (AnyClockPair::PeriodBank(p), rx)
        }
    };
    debug!(family = %control.kind(), restoring = snapshot.is_some(), "clock pair created");
    if let Some(s) = snapshot {
        pair.restore(s)?;
    }
    Ok((pair, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use clock_core::VirtualTimeSource;
    use std::sync::Arc;

    fn env() -> ClockEnv {
        ClockEnv::new(
            Arc::new(ManualScheduler::new()),
            Arc::new(VirtualTimeSource::new(Timestamp::from_millis(0))),
        )
    }

    #[test]
    fn time_control_is_tagged_by_family() {
        let tc: TimeControl = serde_json::from_str(
            r#"{"family":"period_bank","initial_ms":0,"period_ms":30000,"periods_count":5}"#,
        )
        .unwrap();
        assert_eq!(tc, TimeControl::PeriodBank(PeriodBankOptions::new(0, 30_000, 5)));
        let json = serde_json::to_value(TimeControl::Increment(IncrementOptions::new(1))).unwrap();
        assert_eq!(json["family"], "increment");
    }

    #[test]
    fn mismatched_snapshot_is_refused_before_building() {
        let control = TimeControl::Increment(IncrementOptions::new(1_000));
        let snap = AnySnapshot::PeriodBank(Snapshot {
            state: PairState::Ready,
            side_to_move: Side::First,
            players: [PeriodBankPlayer {
                remaining: ClockValue::frozen(1),
                remaining_total: ClockValue::frozen(1),
                remaining_periods: 0,
            }; 2],
            elapsed_at: None,
        });
        let err = create_clock_pair(&control, Some(&snap), Some(&SafetyOptions::default()), &env())
            .unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn restore_at_replays_up_to_the_given_instant() {
        let control = TimeControl::Increment(IncrementOptions::new(10_000));
        let snap = AnySnapshot::Increment(Snapshot {
            state: PairState::Running,
            side_to_move: Side::Second,
            players: [
                ClockValue::frozen(10_000),
                ClockValue::elapsing(Timestamp::from_millis(5_000)),
            ],
            elapsed_at: None,
        });
        let safety = SafetyOptions::default();

        let (mut before, _rx) = create_clock_pair(&control, None, Some(&safety), &env()).unwrap();
        before.restore_at(&snap, Timestamp::from_millis(4_000)).unwrap();
        assert_eq!(before.state(), PairState::Running);

        let (mut after, mut rx) = create_clock_pair(&control, None, Some(&safety), &env()).unwrap();
        after.restore_at(&snap, Timestamp::from_millis(60_000)).unwrap();
        assert_eq!(after.strict_elapsed_at().unwrap(), Timestamp::from_millis(5_000));
        assert_eq!(rx.try_recv().unwrap().side, Side::Second);
    }

    #[test]
    fn safety_cap_applies_to_increment_pairs() {
        let control = TimeControl::Increment(IncrementOptions::new(10_000));
        let (pair, _rx) =
            create_clock_pair(&control, None, Some(&SafetyOptions::capped(2_500)), &env()).unwrap();
        assert_eq!(pair.remaining(Side::First), 2_500);
        assert_eq!(pair.remaining_periods(Side::First), None);
    }
}
