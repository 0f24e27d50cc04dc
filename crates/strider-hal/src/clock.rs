//! Time sources and fixed-rate loop pacing.
//!
//! Every control loop asks a [`Clock`] for the time and sleeps through it, so
//! the same loops can run against the wall clock on a robot or against
//! [`SimClock`] in tests, where sleeping simply advances virtual time.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strider_hal::clock::{Clock, Rate, SimClock};
//!
//! let clock = Arc::new(SimClock::new());
//! let mut rate = Rate::new(clock.clone(), 50.0);
//! rate.sleep();
//! rate.sleep();
//! assert_eq!(clock.now(), Duration::from_millis(40));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// A monotonic time source.
///
/// `now` is measured from an arbitrary, clock-specific epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

// ────────────────────────────────────────────────────────────────────────────
// SystemClock
// ────────────────────────────────────────────────────────────────────────────

/// Wall-clock time measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimClock
// ────────────────────────────────────────────────────────────────────────────

/// Virtual time.  [`Clock::sleep`] advances the clock instead of blocking.
///
/// When several threads share one `SimClock` each sleep advances the common
/// time, so virtual time runs faster than any single loop's rate.  Single
/// threaded tests are fully deterministic.
#[derive(Debug, Default)]
pub struct SimClock {
    nanos: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let other simulated loops make progress.
        thread::yield_now();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rate
// ────────────────────────────────────────────────────────────────────────────

/// Holds a loop at a fixed frequency.
///
/// Each [`Rate::sleep`] waits until one period has elapsed since the previous
/// wake-up.  A tick that overruns its period does not cause a burst of
/// catch-up ticks: the schedule restarts from the late wake-up.
pub struct Rate {
    clock: Arc<dyn Clock>,
    period: Duration,
    last_wake: Duration,
}

impl Rate {
    /// A non-positive or non-finite `hz` gives a zero period (no pacing).
    pub fn new(clock: Arc<dyn Clock>, hz: f32) -> Self {
        let period = if hz > 0.0 && hz.is_finite() {
            Duration::from_nanos((1e9 / f64::from(hz)).round() as u64)
        } else {
            Duration::ZERO
        };
        let last_wake = clock.now();
        Self {
            clock,
            period,
            last_wake,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn sleep(&mut self) {
        let deadline = self.last_wake + self.period;
        let now = self.clock.now();
        if deadline > now {
            self.clock.sleep(deadline - now);
            self.last_wake = deadline;
        } else {
            self.last_wake = now;
        }
    }
}
