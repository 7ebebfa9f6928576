//! Byoyomi family: main time, then a bank of fixed periods reloaded on every move.

use crate::error::{ClockError, ClockResult, InvalidTransition};
use crate::pair::{ClockEnv, ClockPair, ElapsedReceiver, Family, FamilyKind};
use crate::period_bank::PeriodBankClock;
use crate::timer::Timer;
use clock_core::{ClockValue, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// Options of a period-bank clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBankOptions {
    pub initial_ms: u64,
    pub period_ms: u64,
    pub periods_count: u32,
}

impl PeriodBankOptions {
    pub const fn new(initial_ms: u64, period_ms: u64, periods_count: u32) -> Self {
        Self { initial_ms, period_ms, periods_count }
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.period_ms == 0 {
            return Err(ClockError::InvalidOptions("period_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Per-side projection: current main/period value, aggregate, and bank size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBankPlayer {
    pub remaining: ClockValue,
    pub remaining_total: ClockValue,
    pub remaining_periods: u32,
}

#[derive(Debug, Clone)]
pub struct PeriodBankFamily {
    options: PeriodBankOptions,
}

impl PeriodBankFamily {
    pub fn new(options: PeriodBankOptions) -> ClockResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PeriodBankOptions {
        &self.options
    }
}

impl Family for PeriodBankFamily {
    type Countdown = PeriodBankClock;
    type Player = PeriodBankPlayer;

    const KIND: FamilyKind = FamilyKind::PeriodBank;

    fn countdown(&self, timer: Timer) -> PeriodBankClock {
        let o = self.options;
        PeriodBankClock::new(o.initial_ms, o.period_ms, o.periods_count, timer)
    }

    fn complete_move(&self, mover: &mut PeriodBankClock, at: Timestamp) -> Option<Timestamp> {
        mover.pause_by_move_played(at)
    }

    fn project(&self, clock: &PeriodBankClock) -> PeriodBankPlayer {
        PeriodBankPlayer {
            remaining: clock.main_value(),
            remaining_total: clock.total_value(),
            remaining_periods: clock.remaining_periods(),
        }
    }

    fn player_value(player: &PeriodBankPlayer) -> ClockValue {
        player.remaining
    }

    fn validate_player(&self, player: &PeriodBankPlayer) -> Result<(), InvalidTransition> {
        if player.remaining_periods > self.options.periods_count {
            return Err(InvalidTransition::Snapshot(format!(
                "{} periods remaining but only {} configured",
                player.remaining_periods, self.options.periods_count
            )));
        }
        Ok(())
    }

    fn load(
        &self,
        clock: &mut PeriodBankClock,
        player: &PeriodBankPlayer,
        now: Timestamp,
    ) -> Option<Timestamp> {
        clock.set_value(player.remaining, player.remaining_periods, now)
    }

    fn load_inert(&self, clock: &mut PeriodBankClock, player: &PeriodBankPlayer) {
        clock.set_value_inert(player.remaining, player.remaining_periods);
    }
}

/// Pair running the period-bank family.
pub type PeriodBankClockPair = ClockPair<PeriodBankFamily>;

impl ClockPair<PeriodBankFamily> {
    /// Validate `options` and build a `ready` pair.
    pub fn create(
        options: PeriodBankOptions,
        env: &ClockEnv,
    ) -> ClockResult<(Self, ElapsedReceiver)> {
        Ok(Self::new(PeriodBankFamily::new(options)?, env))
    }

    pub fn remaining_periods(&self, side: Side) -> u32 {
        self.with_clock(side, PeriodBankClock::remaining_periods)
    }

    /// Whether `side` has moved past main time into its periods.
    pub fn in_periods(&self, side: Side) -> bool {
        self.with_clock(side, PeriodBankClock::in_periods)
    }
}
