//! Error types raised by clock pairs and their construction.

use crate::pair::{Action, FamilyKind, PairState};
use clock_core::{Side, Timestamp};
use thiserror::Error;

/// Why a requested transition was refused. Always a caller bug, never player input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    /// The operation is not allowed in the pair's current state.
    #[error("cannot {action} while {actual} (requires {expected})")]
    WrongState { action: Action, expected: PairState, actual: PairState },
    /// A push came from the side that is not to move.
    #[error("side {side} pushed but side {to_move} is to move")]
    NotToMove { side: Side, to_move: Side },
    /// A snapshot or time control of one family met a pair of the other.
    #[error("snapshot belongs to the {found} family, pair is {expected}")]
    FamilyMismatch { expected: FamilyKind, found: FamilyKind },
    /// The snapshot describes a state no pair can be in.
    #[error("snapshot rejected: {0}")]
    Snapshot(String),
}

/// Errors emitted by the time-control engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),
    /// A second elapse reached a pair that already elapsed.
    #[error("side {side} elapsed at {at} but the pair already elapsed")]
    DoubleElapse { side: Side, at: Timestamp },
    /// Family options out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl ClockError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, ClockError::InvalidTransition(_))
    }
}

/// Result type for engine operations.
pub type ClockResult<T> = Result<T, ClockError>;
