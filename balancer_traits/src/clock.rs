use std::thread;
use std::time::{Duration, Instant};

/// Time source for the balancing control loop.
///
/// Attempt timeouts and pattern-age bookkeeping are computed as milliseconds
/// from an epoch `Instant` taken when the controller is built, so tests can
/// substitute a hand-advanced clock and drive `max_balance_ms` expiry
/// deterministically.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Pace the caller; the engine itself never sleeps, only the scheduler.
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Real-time clock backed by `std::time::Instant`; the production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}
