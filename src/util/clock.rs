//! Time sources.
//!
//! Components never read the system clock directly; they hold a [`Clock`] so
//! that timers, rate limits and time-of-day buckets can be driven by hand in
//! tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Timelike;
use parking_lot::Mutex;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Monotonic time plus local wall-clock time of day.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Minutes since local midnight, in `0..1440`.
    fn minute_of_day(&self) -> u32;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn minute_of_day(&self) -> u32 {
        let local = chrono::Local::now();
        local.hour() * 60 + local.minute()
    }
}

/// Hand-driven clock.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    /// Seconds since local midnight.
    day_seconds: u64,
}

impl ManualClock {
    /// Clock starting at the current instant and at `minute_of_day`.
    pub fn new(minute_of_day: u32) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Instant::now(),
                day_seconds: u64::from(minute_of_day % MINUTES_PER_DAY) * 60,
            }),
        }
    }

    pub fn shared(minute_of_day: u32) -> Arc<Self> {
        Arc::new(Self::new(minute_of_day))
    }

    /// Move both time sources forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += by;
        state.day_seconds = (state.day_seconds + by.as_secs()) % u64::from(MINUTES_PER_DAY * 60);
    }

    /// Jump the time of day without touching the monotonic instant.
    pub fn set_minute_of_day(&self, minute_of_day: u32) {
        self.state.lock().day_seconds = u64::from(minute_of_day % MINUTES_PER_DAY) * 60;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn minute_of_day(&self) -> u32 {
        (self.state.lock().day_seconds / 60) as u32
    }
}
