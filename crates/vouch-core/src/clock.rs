//! Injectable time source.
//!
//! Expiry checks, slot arithmetic, and intent lifetimes all measure time in
//! epoch milliseconds. Components take an `Arc<dyn Clock>` so tests can move
//! time instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time, milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A clock that only moves when told to. Test use.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Create a manual clock pinned at `start_millis`.
    #[must_use]
    pub const fn new(start_millis: i64) -> Self {
        Self(AtomicI64::new(start_millis))
    }

    /// Advance the clock.
    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute time.
    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
