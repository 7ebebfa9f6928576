//! Single-side countdown and the [`Countdown`] seam the pair drives.

use crate::timer::{Timer, TimerToken};
use clock_core::{ClockValue, Timestamp};

/// One side's countdown: a [`ClockValue`] plus the timer that reports its elapse.
///
/// Every operation that replaces the value cancels the pending timer before
/// committing. Elapse is reported through return values: `Some(instant)` means
/// the clock ran out at `instant`, which may lie in the past.
#[derive(Debug)]
pub struct Clock {
    value: ClockValue,
    timer: Timer,
}

impl Clock {
    /// A stopped clock holding `remaining_ms`.
    pub fn new(remaining_ms: u64, timer: Timer) -> Self {
        Self { value: ClockValue::frozen(remaining_ms), timer }
    }

    /// Current value, as stored.
    pub fn value(&self) -> ClockValue {
        self.value
    }

    /// Raw override used when rehydrating.
    ///
    /// An `Elapsing` value already due at `now` is reported with its own instant
    /// and normalized to `Frozen(0)`; a future one arms the timer.
    #[must_use]
    pub fn set_value(&mut self, value: ClockValue, now: Timestamp) -> Option<Timestamp> {
        let due = self.load(value, now);
        if due.is_some() {
            self.settle_elapsed();
        }
        due
    }

    /// Start counting down from `at`.
    ///
    /// When the elapse instant is not after `now` nothing is scheduled and the
    /// instant is returned; the value stays `Elapsing` so a composing clock can
    /// still extend it.
    #[must_use]
    pub fn run(&mut self, at: Timestamp, now: Timestamp) -> Option<Timestamp> {
        self.timer.cancel();
        self.value = self.value.elapsing_from(at);
        self.arm_or_report(now)
    }

    /// Stop at `at` and return the signed remainder.
    ///
    /// The stored value is clamped at zero. A non-positive return is not
    /// reported as an elapse here; callers decide what it means.
    pub fn pause(&mut self, at: Timestamp) -> i64 {
        self.timer.cancel();
        let remaining = self.value.remaining_at(at);
        self.value = self.value.frozen_at(at);
        remaining
    }

    /// Add `delta_ms` keeping the representation; an elapsing clock is re-armed
    /// for its new instant, or reports it if that instant is still not after `now`.
    #[must_use]
    pub fn increment(&mut self, delta_ms: u64, now: Timestamp) -> Option<Timestamp> {
        self.value = self.value.plus_ms(delta_ms);
        match self.value {
            ClockValue::Frozen { .. } => None,
            ClockValue::Elapsing { .. } => {
                self.timer.cancel();
                self.arm_or_report(now)
            }
        }
    }

    pub fn is_elapsed_at(&self, at: Timestamp) -> bool {
        self.value.is_elapsed_at(at)
    }

    /// Deadline of the pending timer, if any.
    pub fn armed_deadline(&self) -> Option<Timestamp> {
        self.timer.deadline()
    }

    /// Store `value` as-is, arming for a future `Elapsing` value. Due values are
    /// reported but left unsettled.
    pub(crate) fn load(&mut self, value: ClockValue, now: Timestamp) -> Option<Timestamp> {
        self.timer.cancel();
        self.value = value;
        self.arm_or_report(now)
    }

    /// Store `value` without arming anything.
    pub(crate) fn load_inert(&mut self, value: ClockValue) {
        self.timer.cancel();
        self.value = value;
    }

    pub(crate) fn freeze(&mut self, remaining_ms: u64) {
        self.timer.cancel();
        self.value = ClockValue::frozen(remaining_ms);
    }

    pub(crate) fn settle_elapsed(&mut self) {
        self.freeze(0);
    }

    /// Handle a timer wake. Stale tokens are ignored; an early wake re-arms.
    pub(crate) fn on_wake(&mut self, token: TimerToken, now: Timestamp) -> Option<Timestamp> {
        if !self.timer.is_current(token) {
            return None;
        }
        self.timer.cancel();
        self.arm_or_report(now)
    }

    fn arm_or_report(&mut self, now: Timestamp) -> Option<Timestamp> {
        match self.value {
            ClockValue::Elapsing { at } if at <= now => Some(at),
            ClockValue::Elapsing { at } => {
                self.timer.arm(at);
                None
            }
            ClockValue::Frozen { .. } => None,
        }
    }
}

/// What a clock pair needs from each side's countdown.
///
/// Every method returning `Option<Timestamp>` reports an elapse at that
/// instant; after a report the countdown is settled and holds no timer.
pub trait Countdown: Send {
    /// Current main value (the running period for period-bank clocks).
    fn main_value(&self) -> ClockValue;
    /// Main value plus any banked time.
    fn total_value(&self) -> ClockValue;
    /// Start running from `at`.
    fn arm(&mut self, at: Timestamp, now: Timestamp) -> Option<Timestamp>;
    /// Stop at `at` for a break (no per-move rules applied).
    fn halt(&mut self, at: Timestamp) -> Option<Timestamp>;
    /// Timer wake for `token`.
    fn wake(&mut self, token: TimerToken, now: Timestamp) -> Option<Timestamp>;
}

impl Countdown for Clock {
    fn main_value(&self) -> ClockValue {
        self.value
    }

    fn total_value(&self) -> ClockValue {
        self.value
    }

    fn arm(&mut self, at: Timestamp, now: Timestamp) -> Option<Timestamp> {
        let due = self.run(at, now);
        if due.is_some() {
            self.settle_elapsed();
        }
        due
    }

    fn halt(&mut self, at: Timestamp) -> Option<Timestamp> {
        let elapses_at = self.value.elapses_at();
        let remaining = self.pause(at);
        // Running out exactly on the stop instant still counts.
        match elapses_at {
            Some(e) if remaining <= 0 => Some(e),
            _ => None,
        }
    }

    fn wake(&mut self, token: TimerToken, now: Timestamp) -> Option<Timestamp> {
        let due = self.on_wake(token, now);
        if due.is_some() {
            self.settle_elapsed();
        }
        due
    }
}
