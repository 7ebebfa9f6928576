//! Wall-clock instants and the time sources that produce them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// A wall-clock instant in milliseconds since the UNIX epoch.
///
/// Signed so that differences between a stale snapshot instant and "now" stay
/// representable without a separate sign flag.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The UNIX epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Shift by a signed number of milliseconds, saturating at the i64 bounds.
    #[inline]
    pub fn add_ms(self, delta_ms: i64) -> Self {
        Timestamp(self.0.saturating_add(delta_ms))
    }

    /// Shift forward by an unsigned duration, saturating.
    #[inline]
    pub fn add_unsigned_ms(self, delta_ms: u64) -> Self {
        self.add_ms(i64::try_from(delta_ms).unwrap_or(i64::MAX))
    }

    /// Signed milliseconds from `self` until `later` (negative when `later` is earlier).
    #[inline]
    pub fn millis_until(self, later: Timestamp) -> i64 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of "now" for clock control paths.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production time source backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => Timestamp(i64::try_from(since.as_millis()).unwrap_or(i64::MAX)),
            // Host clock set before 1970: keep the sign instead of failing.
            Err(err) => Timestamp(-i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX)),
        }
    }
}

/// Deterministic time source with manual control, for tests and replay.
#[derive(Debug)]
pub struct VirtualTimeSource {
    inner: Mutex<Timestamp>,
}

impl VirtualTimeSource {
    /// Create a virtual source seeded at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self { inner: Mutex::new(start) }
    }

    /// Advance by `delta_ms`.
    pub fn advance_ms(&self, delta_ms: u64) {
        let mut t = self.inner.lock().expect("virtual time poisoned");
        *t = t.add_unsigned_ms(delta_ms);
    }

    /// Jump to an absolute instant (may move backwards).
    pub fn set(&self, value: Timestamp) {
        let mut t = self.inner.lock().expect("virtual time poisoned");
        *t = value;
    }
}

impl TimeSource for VirtualTimeSource {
    fn now(&self) -> Timestamp {
        *self.inner.lock().expect("virtual time poisoned")
    }
}

static PROCESS_TIME: OnceLock<RwLock<Arc<dyn TimeSource>>> = OnceLock::new();

/// Get the process-wide time source (defaults to [`SystemTimeSource`]).
pub fn process_time_source() -> Arc<dyn TimeSource> {
    let lock = PROCESS_TIME.get_or_init(|| RwLock::new(Arc::new(SystemTimeSource)));
    let guard = lock.read().expect("process time source poisoned");
    Arc::clone(&*guard)
}

/// Swap the process-wide time source. Used by tests and replay tooling.
pub fn set_process_time_source(source: Arc<dyn TimeSource>) {
    let lock = PROCESS_TIME.get_or_init(|| RwLock::new(Arc::new(SystemTimeSource)));
    let mut guard = lock.write().expect("process time source poisoned");
    *guard = source;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_time_is_deterministic() {
        let src = VirtualTimeSource::new(Timestamp::from_millis(1_000));
        assert_eq!(src.now(), Timestamp::from_millis(1_000));
        src.advance_ms(5);
        assert_eq!(src.now().as_millis(), 1_005);
        src.set(Timestamp::from_millis(400));
        assert_eq!(src.now().as_millis(), 400);
    }

    #[test]
    fn process_time_source_can_be_swapped() {
        let original = process_time_source();
        set_process_time_source(Arc::new(VirtualTimeSource::new(Timestamp::from_millis(42))));
        assert_eq!(process_time_source().now().as_millis(), 42);
        set_process_time_source(original);
    }

    #[test]
    fn arithmetic_saturates_and_keeps_sign() {
        let t = Timestamp::from_millis(100);
        assert_eq!(t.millis_until(Timestamp::from_millis(40)), -60);
        assert_eq!(t.add_ms(-200).as_millis(), -100);
        assert_eq!(Timestamp::from_millis(i64::MAX).add_unsigned_ms(u64::MAX).as_millis(), i64::MAX);
    }

    #[test]
    fn serializes_as_plain_millis() {
        let json = serde_json::to_string(&Timestamp::from_millis(1_700_000_000_123)).unwrap();
        assert_eq!(json, "1700000000123");
    }
}
