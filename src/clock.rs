//! Time source for the telemetry loop.

use embassy_time::{Instant, Timer};

/// Monotonic clock and sleep, injectable so the loop can run against
/// simulated time.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;

    /// Suspends until `deadline`. Returns immediately if it has already passed.
    async fn sleep_until(&mut self, deadline: Instant);
}

/// The `embassy-time` clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        Timer::at(deadline).await;
    }
}
