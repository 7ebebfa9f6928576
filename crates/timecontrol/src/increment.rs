//! Fischer-style family: a fixed bonus after every move, optionally capped.

use crate::clock::{Clock, Countdown};
use crate::config::SafetyOptions;
use crate::error::{ClockError, ClockResult};
use crate::pair::{ClockEnv, ClockPair, ElapsedReceiver, Family, FamilyKind};
use crate::timer::Timer;
use clock_core::{ClockValue, Timestamp};
use serde::{Deserialize, Serialize};

/// Options of an increment clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementOptions {
    pub initial_ms: u64,
    #[serde(default)]
    pub increment_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<u64>,
}

impl IncrementOptions {
    pub const fn new(initial_ms: u64) -> Self {
        Self { initial_ms, increment_ms: 0, max_ms: None }
    }

    #[must_use]
    pub const fn with_increment(mut self, increment_ms: u64) -> Self {
        self.increment_ms = increment_ms;
        self
    }

    #[must_use]
    pub const fn with_max(mut self, max_ms: u64) -> Self {
        self.max_ms = Some(max_ms);
        self
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.initial_ms == 0 {
            return Err(ClockError::InvalidOptions("initial_ms must be positive".into()));
        }
        match self.max_ms {
            Some(0) => Err(ClockError::InvalidOptions("max_ms must be positive".into())),
            Some(max) if max < self.initial_ms => Err(ClockError::InvalidOptions(format!(
                "max_ms {max} is below initial_ms {}",
                self.initial_ms
            ))),
            _ => Ok(()),
        }
    }
}

/// Increment rules with the safety cap already folded into the maximum.
#[derive(Debug, Clone)]
pub struct IncrementFamily {
    options: IncrementOptions,
    max_ms: Option<u64>,
}

impl IncrementFamily {
    pub fn new(options: IncrementOptions, safety: &SafetyOptions) -> ClockResult<Self> {
        options.validate()?;
        Ok(Self { options, max_ms: safety.cap_max(options.max_ms) })
    }

    pub fn options(&self) -> &IncrementOptions {
        &self.options
    }

    /// Effective maximum after the safety cap.
    pub fn max_ms(&self) -> Option<u64> {
        self.max_ms
    }

    fn clamp(&self, ms: u64) -> u64 {
        self.max_ms.map_or(ms, |max| ms.min(max))
    }
}

impl Family for IncrementFamily {
    type Countdown = Clock;
    type Player = ClockValue;

    const KIND: FamilyKind = FamilyKind::Increment;

    fn countdown(&self, timer: Timer) -> Clock {
        Clock::new(self.clamp(self.options.initial_ms), timer)
    }

    fn complete_move(&self, mover: &mut Clock, at: Timestamp) -> Option<Timestamp> {
        if let Some(elapsed) = mover.halt(at) {
            return Some(elapsed);
        }
        let left = u64::try_from(mover.value().remaining_at(at)).unwrap_or(0);
        mover.freeze(self.clamp(left.saturating_add(self.options.increment_ms)));
        None
    }

    fn project(&self, clock: &Clock) -> ClockValue {
        clock.value()
    }

    fn player_value(player: &ClockValue) -> ClockValue {
        *player
    }

    fn load(&self, clock: &mut Clock, player: &ClockValue, now: Timestamp) -> Option<Timestamp> {
        clock.set_value(*player, now)
    }

    fn load_inert(&self, clock: &mut Clock, player: &ClockValue) {
        clock.load_inert(*player);
    }
}

/// Pair running the increment family.
pub type IncrementClockPair = ClockPair<IncrementFamily>;

impl ClockPair<IncrementFamily> {
    /// Validate `options`, apply `safety`, and build a `ready` pair.
    pub fn create(
        options: IncrementOptions,
        safety: &SafetyOptions,
        env: &ClockEnv,
    ) -> ClockResult<(Self, ElapsedReceiver)> {
        Ok(Self::new(IncrementFamily::new(options, safety)?, env))
    }
}
