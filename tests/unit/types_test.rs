//! Tests for scheduling types

use pipeline_scheduler::core::ScheduleKey;
use pipeline_scheduler::{JobOutcome, RunningState, TaskPriority, TaskType};
use std::time::Duration;

#[test]
fn test_task_type_labels() {
    assert_eq!(TaskType::Global.to_string(), "global");
    assert_eq!(TaskType::Video.to_string(), "video");
    assert_eq!(TaskType::Audio.to_string(), "audio");
    assert_eq!(TaskType::Subtitle.to_string(), "subtitle");
    assert_eq!(TaskType::Singleton.to_string(), "single");
}

#[test]
fn test_priority_serde() {
    let json = serde_json::to_string(&TaskPriority::Highest).unwrap();
    assert_eq!(json, "\"highest\"");
    let parsed: TaskPriority = serde_json::from_str("\"middle\"").unwrap();
    assert_eq!(parsed, TaskPriority::Middle);
}

#[test]
fn test_running_state_transitions() {
    for state in [RunningState::Started, RunningState::Paused, RunningState::Stopped] {
        assert!(!state.is_transient());
        assert_eq!(state.settled(), state);
    }
    assert_eq!(RunningState::Pausing.settled(), RunningState::Paused);
}

#[test]
fn test_job_outcome_conversions() {
    let outcome: JobOutcome = Duration::from_millis(16).into();
    assert_eq!(outcome, JobOutcome::Reschedule(Duration::from_millis(16)));
    assert_eq!(JobOutcome::NOW, JobOutcome::Reschedule(Duration::ZERO));
    assert_ne!(JobOutcome::from_micros(0), JobOutcome::Idle);
}

#[test]
fn test_schedule_key_roundtrip() {
    let key = ScheduleKey::new("pipeline-1", TaskType::Video, TaskPriority::High);
    let json = serde_json::to_string(&key).unwrap();
    let back: ScheduleKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
    assert!(json.contains("\"group\":\"pipeline-1\""));
}
