//! Wire form of snapshots: instants travel as RFC 3339 strings.
//!
//! The engine only ever sees [`Timestamp`]s; conversion to and from text
//! happens here, at the storage boundary.

use crate::SnapshotLogError;
use clock_core::{ClockValue, Side, Timestamp};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use timecontrol::{AnySnapshot, PairState, PeriodBankPlayer, Snapshot};

/// Render `ts` as RFC 3339 in UTC with millisecond precision preserved.
pub fn format_timestamp(ts: Timestamp) -> Result<String, SnapshotLogError> {
    let nanos = i128::from(ts.as_millis()) * 1_000_000;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| SnapshotLogError::Timestamp(format!("{ts}: {e}")))?;
    dt.format(&Rfc3339).map_err(|e| SnapshotLogError::Timestamp(format!("{ts}: {e}")))
}

/// Parse an RFC 3339 instant (any offset) into epoch milliseconds. Sub-millisecond
/// digits are truncated toward the past.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, SnapshotLogError> {
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| SnapshotLogError::Timestamp(format!("{raw:?}: {e}")))?;
    let millis = parsed.unix_timestamp_nanos().div_euclid(1_000_000);
    let millis = i64::try_from(millis)
        .map_err(|_| SnapshotLogError::Timestamp(format!("{raw:?} exceeds millisecond range")))?;
    Ok(Timestamp::from_millis(millis))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    Frozen { remaining_ms: u64 },
    Elapsing { at: String },
}

impl WireValue {
    pub fn encode(value: ClockValue) -> Result<Self, SnapshotLogError> {
        Ok(match value {
            ClockValue::Frozen { remaining_ms } => WireValue::Frozen { remaining_ms },
            ClockValue::Elapsing { at } => WireValue::Elapsing { at: format_timestamp(at)? },
        })
    }

    pub fn decode(&self) -> Result<ClockValue, SnapshotLogError> {
        Ok(match self {
            WireValue::Frozen { remaining_ms } => ClockValue::frozen(*remaining_ms),
            WireValue::Elapsing { at } => ClockValue::elapsing(parse_timestamp(at)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePeriodBankPlayer {
    pub remaining: WireValue,
    pub remaining_total: WireValue,
    pub remaining_periods: u32,
}

impl WirePeriodBankPlayer {
    fn encode(p: &PeriodBankPlayer) -> Result<Self, SnapshotLogError> {
        Ok(Self {
            remaining: WireValue::encode(p.remaining)?,
            remaining_total: WireValue::encode(p.remaining_total)?,
            remaining_periods: p.remaining_periods,
        })
    }

    fn decode(&self) -> Result<PeriodBankPlayer, SnapshotLogError> {
        Ok(PeriodBankPlayer {
            remaining: self.remaining.decode()?,
            remaining_total: self.remaining_total.decode()?,
            remaining_periods: self.remaining_periods,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSnapshot<T> {
    pub state: PairState,
    pub side_to_move: Side,
    pub players: [T; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_at: Option<String>,
}

impl<T> WireSnapshot<T> {
    fn encode<P>(
        s: &Snapshot<P>,
        player: impl Fn(&P) -> Result<T, SnapshotLogError>,
    ) -> Result<Self, SnapshotLogError> {
        Ok(Self {
            state: s.state,
            side_to_move: s.side_to_move,
            players: [player(&s.players[0])?, player(&s.players[1])?],
            elapsed_at: s.elapsed_at.map(format_timestamp).transpose()?,
        })
    }

    fn decode<P>(
        &self,
        player: impl Fn(&T) -> Result<P, SnapshotLogError>,
    ) -> Result<Snapshot<P>, SnapshotLogError> {
        Ok(Snapshot {
            state: self.state,
            side_to_move: self.side_to_move,
            players: [player(&self.players[0])?, player(&self.players[1])?],
            elapsed_at: self.elapsed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Wire counterpart of [`AnySnapshot`], tagged by family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum WireAnySnapshot {
    Increment(WireSnapshot<WireValue>),
    PeriodBank(WireSnapshot<WirePeriodBankPlayer>),
}

impl WireAnySnapshot {
    pub fn encode(snapshot: &AnySnapshot) -> Result<Self, SnapshotLogError> {
        Ok(match snapshot {
            AnySnapshot::Increment(s) => {
                WireAnySnapshot::Increment(WireSnapshot::encode(s, |v| WireValue::encode(*v))?)
            }
            AnySnapshot::PeriodBank(s) => {
                WireAnySnapshot::PeriodBank(WireSnapshot::encode(s, WirePeriodBankPlayer::encode)?)
            }
        })
    }

    pub fn decode(&self) -> Result<AnySnapshot, SnapshotLogError> {
        Ok(match self {
            WireAnySnapshot::Increment(s) => AnySnapshot::Increment(s.decode(WireValue::decode)?),
            WireAnySnapshot::PeriodBank(s) => {
                AnySnapshot::PeriodBank(s.decode(WirePeriodBankPlayer::decode)?)
            }
        })
    }
}
