//! Tests for configuration validation

use pipeline_scheduler::config::scheduler::{
    ENV_CONFIG_FILE, ENV_GUARD_INTERVAL_US, ENV_THREAD_NAME_PREFIX,
};
use pipeline_scheduler::{SchedulerConfig, SchedulerError, ThreadRegistry};
use std::time::Duration;

#[test]
fn test_scheduler_config_defaults() {
    let config = SchedulerConfig::new();
    assert_eq!(config.guard_interval_us, 500);
    assert_eq!(config.global_group, "global");
    assert_eq!(config.thread_name_prefix, "pipe");
    assert_eq!(config.thread_stack_size, 2 * 1024 * 1024);
    assert!(config.apply_thread_priority);
    assert_eq!(config.exit_timeout(), Duration::from_secs(2));
}

#[test]
fn test_scheduler_config_builder() {
    let config = SchedulerConfig::new()
        .with_guard_interval_us(1_000)
        .with_global_group("shared")
        .with_thread_name_prefix("media")
        .with_thread_stack_size(512 * 1024)
        .with_thread_priority(false)
        .with_exit_timeout_ms(250);

    assert!(config.validate().is_ok());
    assert_eq!(config.guard_interval(), Duration::from_millis(1));
    assert_eq!(config.global_group, "shared");
    assert_eq!(config.thread_name_prefix, "media");
    assert!(!config.apply_thread_priority);
    assert_eq!(config.exit_timeout(), Duration::from_millis(250));
}

#[test]
fn test_scheduler_config_invalid_names() {
    assert!(SchedulerConfig::new().with_global_group("").validate().is_err());
    assert!(SchedulerConfig::new().with_thread_name_prefix("").validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_timeout() {
    let config = SchedulerConfig::new().with_exit_timeout_ms(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_scheduler_config_zero_guard_is_valid() {
    let config = SchedulerConfig::new().with_guard_interval_us(0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "guard_interval_us": 250,
        "global_group": "shared",
        "thread_name_prefix": "media",
        "thread_stack_size": 1048576,
        "apply_thread_priority": false,
        "exit_timeout_ms": 500
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.guard_interval_us, 250);
    assert_eq!(config.thread_stack_size, 1_048_576);
    assert!(!config.apply_thread_priority);
}

#[test]
fn test_scheduler_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{ "exit_timeout_ms": 0 }"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_scheduler_config_from_file() {
    let path = std::env::temp_dir().join(format!("pipeline-sched-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "thread_name_prefix": "file" }"#).unwrap();

    let from_file = SchedulerConfig::from_json_file(&path).unwrap();
    assert_eq!(from_file.thread_name_prefix, "file");

    let path_str = path.to_string_lossy().into_owned();
    let overridden = SchedulerConfig::from_lookup(|key| match key {
        k if k == ENV_CONFIG_FILE => Some(path_str.clone()),
        k if k == ENV_THREAD_NAME_PREFIX => Some("env".into()),
        k if k == ENV_GUARD_INTERVAL_US => Some("750".into()),
        _ => None,
    })
    .unwrap();
    assert_eq!(overridden.thread_name_prefix, "env");
    assert_eq!(overridden.guard_interval_us, 750);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_registry_rejects_invalid_config() {
    let result = ThreadRegistry::new(SchedulerConfig::new().with_thread_name_prefix(""));
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
