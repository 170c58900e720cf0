//! Scheduling keys, task states and job outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of pipeline work a task performs; selects which worker thread it shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Mapped onto the single process-wide shared group, whatever group id is given.
    Global,
    /// Video stage; shares a thread with the group's other video tasks.
    Video,
    /// Audio stage; shares a thread with the group's other audio tasks.
    Audio,
    /// Subtitle stage; shares a thread with the group's other subtitle tasks.
    Subtitle,
    /// Never shared: every singleton task gets its own worker thread.
    Singleton,
}

impl TaskType {
    /// Short lowercase label used in thread names and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Singleton => "single",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Priority of the worker thread, fixed when the thread is created.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default priority; the OS default is left untouched.
    #[default]
    Normal,
    /// Above normal.
    Middle,
    /// Latency sensitive.
    High,
    /// Hard real-time-ish stages such as audio rendering.
    Highest,
}

/// Running state of a task.
///
/// Tasks start out [`RunningState::Paused`]. `Pausing` and `Stopping` are transient
/// states set by the asynchronous requests until the worker loop settles them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    /// Jobs are eligible to run.
    Started,
    /// Pause requested, not yet observed by the worker loop.
    Pausing,
    /// Job queue suppressed; messages still run.
    Paused,
    /// Stop requested, not yet observed by the worker loop.
    Stopping,
    /// Job queue suppressed; messages still run.
    Stopped,
}

impl RunningState {
    /// Whether the state is a pending asynchronous transition.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Pausing | Self::Stopping)
    }

    /// State a pending transition settles into.
    #[must_use]
    pub const fn settled(self) -> Self {
        match self {
            Self::Pausing => Self::Paused,
            Self::Stopping => Self::Stopped,
            other => other,
        }
    }
}

/// What a single-loop periodic job wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Run again after the given delay, measured from when the job returned.
    Reschedule(Duration),
    /// Stop rescheduling until the task is started again.
    Idle,
}

impl JobOutcome {
    /// Run again as soon as possible.
    pub const NOW: Self = Self::Reschedule(Duration::ZERO);

    /// Build an outcome from a signed microsecond delay.
    ///
    /// Zero and negative values mean "run again now", never "stop"; use
    /// [`JobOutcome::Idle`] to stop rescheduling.
    #[must_use]
    pub fn from_micros(delay_us: i64) -> Self {
        Self::Reschedule(Duration::from_micros(u64::try_from(delay_us).unwrap_or(0)))
    }
}

impl From<Duration> for JobOutcome {
    fn from(delay: Duration) -> Self {
        Self::Reschedule(delay)
    }
}

/// Key the registry uses to select a worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey {
    /// Caller-chosen affinity group, typically one pipeline instance.
    pub group: String,
    /// Task type; tasks of different types never share a thread.
    pub task_type: TaskType,
    /// Priority applied to a newly created thread.
    pub priority: TaskPriority,
}

impl ScheduleKey {
    /// Create a new key.
    pub fn new(group: impl Into<String>, task_type: TaskType, priority: TaskPriority) -> Self {
        Self {
            group: group.into(),
            task_type,
            priority,
        }
    }
}
