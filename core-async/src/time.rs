//! Time-related operations.
//!
//! Intervals built with [`delayed_interval`] do not fire immediately and do
//! not burst after a stall: a missed tick is pushed back rather than replayed.
//! That is the behaviour periodic remote work wants, since catching up a
//! backlog of ticks would hammer a rate-limited service.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    interval, interval_at, sleep, sleep_until, timeout, Interval, MissedTickBehavior, Sleep,
    Timeout,
};

/// Creates an interval whose first tick fires after one full `period`.
///
/// # Panics
///
/// Panics if `period` is zero, like [`tokio::time::interval`].
pub fn delayed_interval(period: Duration) -> Interval {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
