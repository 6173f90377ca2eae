//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system clocks. Production uses the real
//! monotonic and wall clocks; simulation uses a virtual clock that only moves
//! when the test advances it, so reconnect and typing timers are reproducible.

use std::{fmt::Debug, future::Future, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};

/// Abstract environment providing time and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock()` is only used for message timestamps, never for timer
///   arithmetic
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant used for every timer.
    ///
    /// Production uses `std::time::Instant`; simulation uses virtual time.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration> + 'static;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current calendar time, stamped onto locally created messages.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// Only driver and runtime code awaits this. State machines take `now`
    /// as a parameter instead.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
