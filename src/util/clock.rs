//! Monotonic microsecond clock shared by every task and worker thread.
//!
//! Scheduling timestamps are signed microsecond offsets from a process-wide epoch
//! captured on first use. Signed values leave room for the "nothing scheduled"
//! sentinel kept in atomics.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed since the scheduler epoch.
#[must_use]
pub fn now_us() -> i64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    i64::try_from(epoch.elapsed().as_micros()).unwrap_or(i64::MAX)
}

/// Timestamp `delay` from now, saturating instead of overflowing.
#[must_use]
pub fn deadline_after(delay: Duration) -> i64 {
    now_us().saturating_add(duration_to_us(delay))
}

/// Convert a duration into whole microseconds, saturating at `i64::MAX`.
#[must_use]
pub fn duration_to_us(delay: Duration) -> i64 {
    i64::try_from(delay.as_micros()).unwrap_or(i64::MAX)
}
