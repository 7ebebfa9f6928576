//! Chess-clock time-control engine.
//!
//! Tracks the remaining time of both sides of a two-player match, switches the
//! running clock on every move, applies family rules (Fischer increment or
//! byoyomi period bank), and rebuilds exact state from a snapshot taken any
//! time earlier, including elapses that should already have happened.
//!
//! ```no_run
//! use std::sync::Arc;
//! use timecontrol::{create_clock_pair, ClockEnv, IncrementOptions, ManualScheduler, TimeControl};
//! use clock_core::{Side, TimeSource, VirtualTimeSource, Timestamp};
//!
//! let time = Arc::new(VirtualTimeSource::new(Timestamp::from_millis(0)));
//! let env = ClockEnv::new(Arc::new(ManualScheduler::new()), time.clone());
//! let control = TimeControl::Increment(IncrementOptions::new(60_000).with_increment(1_000));
//! let (mut pair, _elapsed) = create_clock_pair(&control, None, None, &env)?;
//! pair.start(time.now())?;
//! time.advance_ms(4_000);
//! pair.push(Side::First, time.now())?;
//! assert_eq!(pair.remaining(Side::First), 57_000);
//! # Ok::<(), timecontrol::ClockError>(())
//! ```

#![deny(unsafe_code)]

pub mod byoyomi;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod increment;
pub mod pair;
pub mod period_bank;
pub mod timer;

pub use byoyomi::{PeriodBankClockPair, PeriodBankFamily, PeriodBankOptions, PeriodBankPlayer};
pub use clock::{Clock, Countdown};
pub use config::{process_safety, set_process_safety, ConfigError, EngineConfig, SafetyOptions};
pub use error::{ClockError, ClockResult, InvalidTransition};
pub use factory::{create_clock_pair, AnyClockPair, AnySnapshot, TimeControl};
pub use increment::{IncrementClockPair, IncrementFamily, IncrementOptions};
pub use pair::{
    Action, ClockEnv, ClockPair, ElapsedReceiver, ElapsedRecord, Family, FamilyKind, PairState,
    Snapshot,
};
pub use period_bank::PeriodBankClock;
pub use timer::{ManualScheduler, Scheduler, Timer, TimerToken, TokioScheduler};
