//! Per-clock arm/cancel timer capability and the schedulers backing it.
//!
//! A [`Timer`] is owned by exactly one clock. Arming always cancels the
//! previous wake first and hands out a fresh [`TimerToken`]; the owner checks
//! the token under its own lock when the wake arrives, so a wake that raced a
//! re-arm is discarded even if it was already running.

use clock_core::{TimeSource, Timestamp};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

/// Identifies one arming of a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Callback run by a scheduler once a deadline passes.
pub type Wake = Box<dyn FnOnce() + Send + 'static>;

/// Invoked with the token of the arming that fired.
pub type FireHook = Arc<dyn Fn(TimerToken) + Send + Sync + 'static>;

/// Something that can run a callback at a wall-clock deadline.
pub trait Scheduler: Send + Sync {
    /// Schedule `wake` for `deadline`. Dropping the returned handle cancels it.
    fn schedule(&self, deadline: Timestamp, wake: Wake) -> ScheduledWake;
}

/// Cancellation handle for one scheduled wake.
pub struct ScheduledWake {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl ScheduledWake {
    pub fn new(cancelled: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self { cancelled, task }
    }

    /// A handle with nothing behind it.
    pub fn inert() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(true)), task: None }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for ScheduledWake {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for ScheduledWake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledWake").field("cancelled", &self.is_cancelled()).finish()
    }
}

struct Armed {
    token: TimerToken,
    deadline: Timestamp,
    _wake: ScheduledWake,
}

/// Arm/cancel capability owned by a single clock.
pub struct Timer {
    scheduler: Option<Arc<dyn Scheduler>>,
    on_fire: Option<FireHook>,
    generation: u64,
    armed: Option<Armed>,
}

impl Timer {
    pub fn new(scheduler: Arc<dyn Scheduler>, on_fire: FireHook) -> Self {
        Self { scheduler: Some(scheduler), on_fire: Some(on_fire), generation: 0, armed: None }
    }

    /// A timer that records deadlines but never wakes anyone.
    pub fn detached() -> Self {
        Self { scheduler: None, on_fire: None, generation: 0, armed: None }
    }

    /// Cancel any pending wake, then schedule a new one for `deadline`.
    pub fn arm(&mut self, deadline: Timestamp) -> TimerToken {
        self.cancel();
        self.generation += 1;
        let token = TimerToken(self.generation);
        let wake = match (&self.scheduler, &self.on_fire) {
            (Some(scheduler), Some(hook)) => {
                let hook = Arc::clone(hook);
                scheduler.schedule(deadline, Box::new(move || hook(token)))
            }
            _ => ScheduledWake::inert(),
        };
        self.armed = Some(Armed { token, deadline, _wake: wake });
        token
    }

    pub fn cancel(&mut self) {
        // Dropping the handle cancels the wake.
        self.armed = None;
    }

    /// Whether `token` belongs to the arming currently pending.
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.armed.as_ref().is_some_and(|a| a.token == token)
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.armed.as_ref().map(|a| a.deadline)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("generation", &self.generation)
            .field("deadline", &self.deadline())
            .field("attached", &self.scheduler.is_some())
            .finish()
    }
}

// Longest single sleep; longer waits loop so wall-clock jumps are re-checked.
const MAX_SLEEP_MS: u64 = 60 * 60 * 1000;

/// Scheduler backed by tokio tasks sleeping until the deadline.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    time: Arc<dyn TimeSource>,
}

impl TokioScheduler {
    pub fn new(handle: Handle, time: Arc<dyn TimeSource>) -> Self {
        Self { handle, time }
    }

    /// Use the runtime the caller is running in, if any.
    pub fn try_current(time: Arc<dyn TimeSource>) -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(handle, time))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, deadline: Timestamp, wake: Wake) -> ScheduledWake {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let time = Arc::clone(&self.time);
        let task = self.handle.spawn(async move {
            loop {
                let wait = time.now().millis_until(deadline);
                if wait <= 0 {
                    break;
                }
                let wait = u64::try_from(wait).unwrap_or(0).min(MAX_SLEEP_MS);
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
            if flag.load(Ordering::Acquire) {
                trace!(%deadline, "timer cancelled before wake");
                return;
            }
            wake();
        });
        ScheduledWake::new(cancelled, Some(task.abort_handle()))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler").finish_non_exhaustive()
    }
}

struct Pending {
    deadline: Timestamp,
    cancelled: Arc<AtomicBool>,
    wake: Wake,
}

/// Deterministic scheduler: wakes run only when [`ManualScheduler::fire_due`] is called.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Pending>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wakes still scheduled and not cancelled.
    pub fn pending(&self) -> usize {
        let g = self.pending.lock().expect("manual scheduler poisoned");
        g.iter().filter(|p| !p.cancelled.load(Ordering::Acquire)).count()
    }

    /// Earliest live deadline.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        let g = self.pending.lock().expect("manual scheduler poisoned");
        g.iter().filter(|p| !p.cancelled.load(Ordering::Acquire)).map(|p| p.deadline).min()
    }

    /// Run every live wake whose deadline is at or before `now`. Returns how many ran.
    pub fn fire_due(&self, now: Timestamp) -> usize {
        let due: Vec<Pending> = {
            let mut g = self.pending.lock().expect("manual scheduler poisoned");
            let (due, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *g)
                .into_iter()
                .partition(|p| p.deadline <= now || p.cancelled.load(Ordering::Acquire));
            *g = keep;
            due
        };
        // Wakes may re-arm, which locks `pending` again.
        let mut fired = 0;
        for p in due {
            if !p.cancelled.load(Ordering::Acquire) {
                (p.wake)();
                fired += 1;
            }
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, deadline: Timestamp, wake: Wake) -> ScheduledWake {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut g = self.pending.lock().expect("manual scheduler poisoned");
        g.retain(|p| !p.cancelled.load(Ordering::Acquire));
        g.push(Pending { deadline, cancelled: Arc::clone(&cancelled), wake });
        ScheduledWake::new(cancelled, None)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler").field("pending", &self.pending()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn counting_hook() -> (FireHook, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }), hits)
    }

    #[test]
    fn rearm_cancels_previous_wake() {
        let sched = Arc::new(ManualScheduler::new());
        let (hook, hits) = counting_hook();
        let mut timer = Timer::new(Arc::clone(&sched) as Arc<dyn Scheduler>, hook);
        let first = timer.arm(t(100));
        let second = timer.arm(t(200));
        assert_ne!(first, second);
        assert!(!timer.is_current(first));
        assert_eq!(sched.pending(), 1);
        assert_eq!(sched.fire_due(t(150)), 0);
        assert_eq!(sched.fire_due(t(200)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_drops_pending_wake() {
        let sched = Arc::new(ManualScheduler::new());
        let (hook, hits) = counting_hook();
        let mut timer = Timer::new(Arc::clone(&sched) as Arc<dyn Scheduler>, hook);
        timer.arm(t(10));
        timer.cancel();
        assert_eq!(timer.deadline(), None);
        assert_eq!(sched.next_deadline(), None);
        assert_eq!(sched.fire_due(t(1_000)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rearming_does_not_accumulate_cancelled_wakes() {
        let sched = Arc::new(ManualScheduler::new());
        let (hook, _) = counting_hook();
        let mut timer = Timer::new(Arc::clone(&sched) as Arc<dyn Scheduler>, hook);
        for ms in 0..10_000 {
            timer.arm(t(ms));
        }
        assert_eq!(sched.pending(), 1);
        assert_eq!(sched.pending.lock().unwrap().len(), 1);
    }

    #[test]
    fn detached_timer_tracks_deadline_only() {
        let mut timer = Timer::detached();
        let token = timer.arm(t(5));
        assert!(timer.is_current(token));
        assert_eq!(timer.deadline(), Some(t(5)));
    }
}
