//! Time-control core primitives and shared types.

#![deny(unsafe_code)]

/// Version of the clock core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod time;

pub use side::{InvalidSide, Side};
pub use time::{SystemTimeSource, TimeSource, Timestamp, VirtualTimeSource};
pub use value::ClockValue;

pub mod side {
    //! The two players of a match.

    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// One of the two players, serialized as `0` / `1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(into = "u8", try_from = "u8")]
    pub enum Side {
        /// Index 0, to move first.
        First,
        /// Index 1.
        Second,
    }

    /// Raised when decoding a side index other than 0 or 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("side index must be 0 or 1, got {0}")]
    pub struct InvalidSide(pub u8);

    impl Side {
        /// Both sides in index order.
        pub const BOTH: [Side; 2] = [Side::First, Side::Second];

        #[inline]
        pub const fn index(self) -> usize {
            match self {
                Side::First => 0,
                Side::Second => 1,
            }
        }

        #[inline]
        pub const fn opponent(self) -> Side {
            match self {
                Side::First => Side::Second,
                Side::Second => Side::First,
            }
        }
    }

    impl From<Side> for u8 {
        fn from(side: Side) -> u8 {
            match side {
                Side::First => 0,
                Side::Second => 1,
            }
        }
    }

    impl TryFrom<u8> for Side {
        type Error = InvalidSide;

        fn try_from(raw: u8) -> Result<Self, Self::Error> {
            match raw {
                0 => Ok(Side::First),
                1 => Ok(Side::Second),
                other => Err(InvalidSide(other)),
            }
        }
    }

    impl fmt::Display for Side {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.index())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn opponent_flips() {
            assert_eq!(Side::First.opponent(), Side::Second);
            assert_eq!(Side::Second.opponent().opponent(), Side::Second);
        }

        #[test]
        fn serde_uses_indices() {
            assert_eq!(serde_json::to_string(&Side::Second).unwrap(), "1");
            let s: Side = serde_json::from_str("0").unwrap();
            assert_eq!(s, Side::First);
            assert!(serde_json::from_str::<Side>("2").is_err());
        }
    }
}

pub mod value {
    //! Clock value representation: frozen remainder or running toward an instant.
    //!
    //! Every conversion between the two forms goes through this module so the
    //! "now" reference is applied in exactly one place.

    use crate::time::Timestamp;
    use serde::{Deserialize, Serialize};

    /// Remaining time of one side.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ClockValue {
        /// Stopped with this many milliseconds left.
        Frozen { remaining_ms: u64 },
        /// Running; reaches zero at `at`.
        Elapsing { at: Timestamp },
    }

    impl ClockValue {
        #[inline]
        pub const fn frozen(remaining_ms: u64) -> Self {
            ClockValue::Frozen { remaining_ms }
        }

        #[inline]
        pub const fn elapsing(at: Timestamp) -> Self {
            ClockValue::Elapsing { at }
        }

        /// Signed milliseconds left at `now`; negative once an elapsing value is overdue.
        pub fn remaining_at(self, now: Timestamp) -> i64 {
            match self {
                ClockValue::Frozen { remaining_ms } => {
                    i64::try_from(remaining_ms).unwrap_or(i64::MAX)
                }
                ClockValue::Elapsing { at } => now.millis_until(at),
            }
        }

        /// Frozen form at `now`, clamped at zero.
        pub fn frozen_at(self, now: Timestamp) -> ClockValue {
            match self {
                ClockValue::Frozen { .. } => self,
                ClockValue::Elapsing { .. } => {
                    let left = self.remaining_at(now).max(0);
                    ClockValue::frozen(u64::try_from(left).unwrap_or(0))
                }
            }
        }

        /// Elapsing form if started at `from`.
        pub fn elapsing_from(self, from: Timestamp) -> ClockValue {
            match self {
                ClockValue::Frozen { remaining_ms } => {
                    ClockValue::elapsing(from.add_unsigned_ms(remaining_ms))
                }
                ClockValue::Elapsing { .. } => self,
            }
        }

        /// Add time without changing the representation.
        pub fn plus_ms(self, delta_ms: u64) -> ClockValue {
            match self {
                ClockValue::Frozen { remaining_ms } => {
                    ClockValue::frozen(remaining_ms.saturating_add(delta_ms))
                }
                ClockValue::Elapsing { at } => ClockValue::elapsing(at.add_unsigned_ms(delta_ms)),
            }
        }

        #[inline]
        pub fn is_elapsed_at(self, at: Timestamp) -> bool {
            matches!(self, ClockValue::Elapsing { at: e } if e <= at)
        }

        #[inline]
        pub fn elapses_at(self) -> Option<Timestamp> {
            match self {
                ClockValue::Elapsing { at } => Some(at),
                ClockValue::Frozen { .. } => None,
            }
        }

        #[inline]
        pub fn is_elapsing(self) -> bool {
            matches!(self, ClockValue::Elapsing { .. })
        }
    }

}
