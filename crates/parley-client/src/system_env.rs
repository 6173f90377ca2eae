//! Production environment using system clocks.
//!
//! `SystemEnv` is the production implementation of the [`Environment`]
//! trait: the monotonic clock for timers, the calendar clock for message
//! timestamps and Tokio for sleeping.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parley_core::Environment;

/// Production environment using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
