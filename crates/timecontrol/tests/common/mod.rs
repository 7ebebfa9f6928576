#![allow(dead_code)]

use clock_core::{TimeSource, Timestamp, VirtualTimeSource};
use std::sync::Arc;
use timecontrol::{ClockEnv, ManualScheduler};

pub const T0: i64 = 1_700_000_000_000;

/// Deterministic environment: virtual time plus a manually driven scheduler.
pub struct Harness {
    pub time: Arc<VirtualTimeSource>,
    pub scheduler: Arc<ManualScheduler>,
    pub env: ClockEnv,
}

impl Harness {
    pub fn new() -> Self {
        let time = Arc::new(VirtualTimeSource::new(Timestamp::from_millis(T0)));
        let scheduler = Arc::new(ManualScheduler::new());
        let env = ClockEnv::new(scheduler.clone(), time.clone());
        Self { time, scheduler, env }
    }

    pub fn now(&self) -> Timestamp {
        self.time.now()
    }

    /// Move time forward and run every timer that came due.
    pub fn advance(&self, ms: u64) -> usize {
        self.time.advance_ms(ms);
        self.scheduler.fire_due(self.time.now())
    }
}
