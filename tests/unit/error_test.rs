//! Tests for error types

use pipeline_scheduler::core::SchedulerError;
use std::error::Error as _;

#[test]
fn test_single_loop_error() {
    let err = SchedulerError::SingleLoop("renderer".to_string());
    assert_eq!(
        format!("{err}"),
        "task `renderer` runs a single periodic job and does not accept queued jobs"
    );
}

#[test]
fn test_not_single_loop_error() {
    let err = SchedulerError::NotSingleLoop("demuxer".to_string());
    assert_eq!(
        format!("{err}"),
        "task `demuxer` uses queued scheduling and cannot register a periodic job"
    );
}

#[test]
fn test_job_dropped_error() {
    let err = SchedulerError::JobDropped;
    assert_eq!(format!("{err}"), "job was dropped before it ran");
    assert!(err.source().is_none());
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("thread_stack_size must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: thread_stack_size must be greater than 0"
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    let err: anyhow::Error = SchedulerError::ThreadExited("pipe-g-audio".into()).into();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
