//! Virtual-time environment.
//!
//! `SimEnv` only moves its clocks when told to, so reconnect and typing
//! timers fire at exactly the same virtual instant on every run.

use std::{
    future::Future,
    ops::{Add, Sub},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use parley_core::Environment;

/// Calendar time at virtual time zero: 2024-05-01T12:00:00Z.
pub const SIM_EPOCH_SECS: i64 = 1_714_564_800;

/// Virtual monotonic instant, in milliseconds since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(u64);

impl SimInstant {
    /// Milliseconds since the simulation started.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    /// Saturates at zero, like `std::time::Instant`.
    fn sub(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, delta: Duration) -> Self {
        Self(self.0 + delta.as_millis() as u64)
    }
}

/// Simulation environment with a shared virtual clock.
///
/// Clones share the clock, so the driver, the session and the test all
/// observe the same time.
#[derive(Debug, Clone, Default)]
pub struct SimEnv {
    millis: Arc<AtomicU64>,
}

impl SimEnv {
    /// Create an environment at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.millis.fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }

    /// Time elapsed since the simulation started.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        SimInstant(self.millis.load(Ordering::SeqCst))
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let epoch = DateTime::<Utc>::from_timestamp(SIM_EPOCH_SECS, 0).unwrap_or_default();
        epoch + self.elapsed()
    }

    /// Advances virtual time and completes immediately.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new();
        let other = env.clone();
        let start = env.now();

        other.advance(Duration::from_millis(1500));

        assert_eq!(env.now() - start, Duration::from_millis(1500));
        assert_eq!(env.now(), start + Duration::from_millis(1500));
    }

    #[test]
    fn instants_saturate_instead_of_underflowing() {
        let earlier = SimInstant(10);
        let later = SimInstant(40);
        assert_eq!(earlier - later, Duration::ZERO);
    }

    #[test]
    fn wall_clock_tracks_virtual_time() {
        let env = SimEnv::new();
        env.advance(Duration::from_secs(90));
        assert_eq!(env.wall_clock().to_rfc3339(), "2024-05-01T12:01:30+00:00");
    }

    #[tokio::test]
    async fn sleep_advances_without_waiting() {
        let env = SimEnv::new();
        env.sleep(Duration::from_secs(3600)).await;
        assert_eq!(env.elapsed(), Duration::from_secs(3600));
    }
}
