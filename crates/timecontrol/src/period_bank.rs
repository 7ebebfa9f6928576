//! Countdown with a bank of fixed-length reload periods (byoyomi).

use crate::clock::{Clock, Countdown};
use crate::timer::{Timer, TimerToken};
use clock_core::{ClockValue, Timestamp};

/// A [`Clock`] holding main time or the current period, backed by
/// `remaining_periods` further periods of `period_ms` each.
#[derive(Debug)]
pub struct PeriodBankClock {
    inner: Clock,
    remaining_periods: u32,
    period_ms: u64,
    periods_count: u32,
}

impl PeriodBankClock {
    pub fn new(initial_ms: u64, period_ms: u64, periods_count: u32, timer: Timer) -> Self {
        Self {
            inner: Clock::new(initial_ms, timer),
            remaining_periods: periods_count,
            period_ms,
            periods_count,
        }
    }

    pub fn main_value(&self) -> ClockValue {
        self.inner.value()
    }

    /// Main value plus every banked period.
    pub fn total_value(&self) -> ClockValue {
        let banked = u64::from(self.remaining_periods).saturating_mul(self.period_ms);
        self.inner.value().plus_ms(banked)
    }

    pub fn remaining_periods(&self) -> u32 {
        self.remaining_periods
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn periods_count(&self) -> u32 {
        self.periods_count
    }

    /// Whether the side has started consuming periods.
    pub fn in_periods(&self) -> bool {
        self.remaining_periods < self.periods_count
    }

    pub fn armed_deadline(&self) -> Option<Timestamp> {
        self.inner.armed_deadline()
    }

    /// Start the inner clock; periods overdue at `now` are consumed right away,
    /// each extending from the instant the previous one ran out.
    #[must_use]
    pub fn run(&mut self, at: Timestamp, now: Timestamp) -> Option<Timestamp> {
        let due = self.inner.run(at, now);
        self.absorb(due, now)
    }

    /// Stop for a break. Overdue time is paid from the bank; with the bank
    /// exhausted the clock elapses at `at`.
    #[must_use]
    pub fn pause(&mut self, at: Timestamp) -> Option<Timestamp> {
        let remaining = self.inner.pause(at);
        if remaining > 0 {
            return None;
        }
        let deficit = remaining.unsigned_abs();
        let Some(periods) = self.periods_to_cover(deficit) else {
            self.remaining_periods = 0;
            self.inner.settle_elapsed();
            return Some(at);
        };
        self.remaining_periods -= periods;
        self.inner.freeze(self.bank_ms(periods) - deficit);
        None
    }

    /// Stop because the side completed a move: like [`pause`](Self::pause), then a
    /// move finished inside a period reloads that period to full length.
    #[must_use]
    pub fn pause_by_move_played(&mut self, at: Timestamp) -> Option<Timestamp> {
        if let Some(elapsed) = self.pause(at) {
            return Some(elapsed);
        }
        if self.remaining_periods == self.periods_count {
            return None;
        }
        self.inner.freeze(self.period_ms);
        None
    }

    /// Rehydrate main value and bank. Overdue time is consumed as in [`run`](Self::run).
    #[must_use]
    pub fn set_value(
        &mut self,
        main: ClockValue,
        remaining_periods: u32,
        now: Timestamp,
    ) -> Option<Timestamp> {
        self.remaining_periods = remaining_periods;
        let due = self.inner.load(main, now);
        self.absorb(due, now)
    }

    pub(crate) fn set_value_inert(&mut self, main: ClockValue, remaining_periods: u32) {
        self.remaining_periods = remaining_periods;
        self.inner.load_inert(main);
    }

    fn absorb(&mut self, due: Option<Timestamp>, now: Timestamp) -> Option<Timestamp> {
        let elapsed_at = due?;
        let overdue = u64::try_from(elapsed_at.millis_until(now)).unwrap_or(0);
        let Some(periods) = self.periods_to_cover(overdue) else {
            let ran_out = elapsed_at.add_unsigned_ms(self.bank_ms(self.remaining_periods));
            self.remaining_periods = 0;
            self.inner.settle_elapsed();
            return Some(ran_out);
        };
        self.remaining_periods -= periods;
        let due = self.inner.increment(self.bank_ms(periods), now);
        if due.is_some() {
            self.inner.settle_elapsed();
        }
        due
    }

    /// Fewest periods that lift a clock `deficit_ms` in the red back above
    /// zero, or `None` when the bank is too small (always so for zero-length periods).
    fn periods_to_cover(&self, deficit_ms: u64) -> Option<u32> {
        let needed = deficit_ms.checked_div(self.period_ms)?.checked_add(1)?;
        u32::try_from(needed).ok().filter(|n| *n <= self.remaining_periods)
    }

    fn bank_ms(&self, periods: u32) -> u64 {
        u64::from(periods).saturating_mul(self.period_ms)
    }
}

impl Countdown for PeriodBankClock {
    fn main_value(&self) -> ClockValue {
        PeriodBankClock::main_value(self)
    }

    fn total_value(&self) -> ClockValue {
        PeriodBankClock::total_value(self)
    }

    fn arm(&mut self, at: Timestamp, now: Timestamp) -> Option<Timestamp> {
        self.run(at, now)
    }

    fn halt(&mut self, at: Timestamp) -> Option<Timestamp> {
        self.pause(at)
    }

    fn wake(&mut self, token: TimerToken, now: Timestamp) -> Option<Timestamp> {
        let due = self.inner.on_wake(token, now);
        self.absorb(due, now)
    }
}
