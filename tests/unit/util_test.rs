//! Tests for utility functions

use pipeline_scheduler::util::{deadline_after, duration_to_us, init_tracing, now_us};
use std::time::Duration;

#[test]
fn test_clock_starts_near_zero_and_advances() {
    let a = now_us();
    assert!(a >= 0);
    std::thread::sleep(Duration::from_millis(1));
    assert!(now_us() > a);
}

#[test]
fn test_deadline_saturates() {
    assert_eq!(deadline_after(Duration::MAX), i64::MAX);
    assert_eq!(duration_to_us(Duration::from_millis(3)), 3_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!(component = "util_test", "Tracing initialised");
}
