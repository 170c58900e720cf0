//! Scheduler configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable naming a JSON configuration file.
pub const ENV_CONFIG_FILE: &str = "PIPELINE_SCHED_CONFIG";
/// Environment variable overriding [`SchedulerConfig::guard_interval_us`].
pub const ENV_GUARD_INTERVAL_US: &str = "PIPELINE_SCHED_GUARD_INTERVAL_US";
/// Environment variable overriding [`SchedulerConfig::global_group`].
pub const ENV_GLOBAL_GROUP: &str = "PIPELINE_SCHED_GLOBAL_GROUP";
/// Environment variable overriding [`SchedulerConfig::thread_name_prefix`].
pub const ENV_THREAD_NAME_PREFIX: &str = "PIPELINE_SCHED_THREAD_NAME_PREFIX";
/// Environment variable overriding [`SchedulerConfig::thread_stack_size`].
pub const ENV_THREAD_STACK_SIZE: &str = "PIPELINE_SCHED_THREAD_STACK_SIZE";
/// Environment variable overriding [`SchedulerConfig::apply_thread_priority`].
pub const ENV_APPLY_THREAD_PRIORITY: &str = "PIPELINE_SCHED_APPLY_THREAD_PRIORITY";
/// Environment variable overriding [`SchedulerConfig::exit_timeout_ms`].
pub const ENV_EXIT_TIMEOUT_MS: &str = "PIPELINE_SCHED_EXIT_TIMEOUT_MS";

/// Scheduler-wide tuning shared by a registry and every worker thread it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Guard interval in microseconds. Work due within this window is run
    /// immediately instead of sleeping for it, and timed sleeps are extended by it.
    pub guard_interval_us: u64,
    /// Group every [`TaskType::Global`](crate::TaskType::Global) task is mapped to.
    pub global_group: String,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Stack size of worker threads in bytes.
    pub thread_stack_size: usize,
    /// Whether worker threads apply an OS priority derived from the task priority.
    pub apply_thread_priority: bool,
    /// How long retiring a worker waits for its loop to exit before detaching it.
    pub exit_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            guard_interval_us: 500,
            global_group: "global".into(),
            thread_name_prefix: "pipe".into(),
            thread_stack_size: 2 * 1024 * 1024,
            apply_thread_priority: true,
            exit_timeout_ms: 2_000,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guard interval.
    #[must_use]
    pub const fn with_guard_interval_us(mut self, guard_interval_us: u64) -> Self {
        self.guard_interval_us = guard_interval_us;
        self
    }

    /// Set the name of the shared global group.
    #[must_use]
    pub fn with_global_group(mut self, group: impl Into<String>) -> Self {
        self.global_group = group.into();
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Enable or disable OS thread priorities.
    #[must_use]
    pub const fn with_thread_priority(mut self, apply: bool) -> Self {
        self.apply_thread_priority = apply;
        self
    }

    /// Set the worker exit timeout.
    #[must_use]
    pub const fn with_exit_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.exit_timeout_ms = timeout_ms;
        self
    }

    /// Guard interval as a [`Duration`].
    #[must_use]
    pub const fn guard_interval(&self) -> Duration {
        Duration::from_micros(self.guard_interval_us)
    }

    /// Exit timeout as a [`Duration`].
    #[must_use]
    pub const fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.global_group.is_empty() {
            return Err("global_group must not be empty".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if self.exit_timeout_ms == 0 {
            return Err("exit_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }

    /// Build configuration from the process environment.
    ///
    /// A `.env` file is loaded first if present. If `PIPELINE_SCHED_CONFIG` names a
    /// JSON file it provides the base values; individual `PIPELINE_SCHED_*`
    /// variables override them.
    ///
    /// # Errors
    ///
    /// Fails if the config file is unreadable or a variable does not parse.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Fails if the config file is unreadable or a variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        if let Some(raw) = lookup(ENV_GUARD_INTERVAL_US) {
            cfg.guard_interval_us = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_GUARD_INTERVAL_US}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_GLOBAL_GROUP) {
            cfg.global_group = raw;
        }
        if let Some(raw) = lookup(ENV_THREAD_NAME_PREFIX) {
            cfg.thread_name_prefix = raw;
        }
        if let Some(raw) = lookup(ENV_THREAD_STACK_SIZE) {
            cfg.thread_stack_size = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_THREAD_STACK_SIZE}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_APPLY_THREAD_PRIORITY) {
            cfg.apply_thread_priority = parse_flag(&raw)
                .with_context(|| format!("{ENV_APPLY_THREAD_PRIORITY}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_EXIT_TIMEOUT_MS) {
            cfg.exit_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_EXIT_TIMEOUT_MS}={raw}"))?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_flag(raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got `{other}`")),
    }
}
