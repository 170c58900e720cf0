//! Fluent construction of tasks.

use std::sync::Arc;

use crate::core::{ScheduleKey, SchedulerError, Task, TaskPriority, TaskType, ThreadRegistry};

/// Builder for a [`Task`].
///
/// Defaults: group `"default"`, [`TaskType::Global`], [`TaskPriority::Normal`],
/// queued discipline, and the process-wide [`ThreadRegistry::global`].
///
/// ```rust,no_run
/// use pipeline_scheduler::{SchedulerConfig, TaskBuilder, TaskType, ThreadRegistry};
///
/// let registry = ThreadRegistry::new(SchedulerConfig::default())?;
/// let task = TaskBuilder::new("subtitle-parser")
///     .group("pipeline-7")
///     .task_type(TaskType::Subtitle)
///     .registry(registry)
///     .build()?;
/// task.start();
/// # Ok::<(), pipeline_scheduler::SchedulerError>(())
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct TaskBuilder {
    name: String,
    group: String,
    task_type: TaskType,
    priority: TaskPriority,
    single_loop: bool,
    registry: Option<Arc<ThreadRegistry>>,
}

impl TaskBuilder {
    /// Start building a task called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: "default".into(),
            task_type: TaskType::Global,
            priority: TaskPriority::Normal,
            single_loop: false,
            registry: None,
        }
    }

    /// Affinity group, typically one pipeline instance.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Task type.
    pub const fn task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Priority used if a new worker thread has to be created.
    pub const fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Use the single-loop discipline (one periodic job) instead of queues.
    pub const fn single_loop(mut self, single_loop: bool) -> Self {
        self.single_loop = single_loop;
        self
    }

    /// Schedule on `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<ThreadRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create the task and attach it to its worker thread.
    ///
    /// The task starts out paused.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ThreadSpawn` if a needed worker could not be created.
    pub fn build(self) -> Result<Task, SchedulerError> {
        let registry = self.registry.unwrap_or_else(ThreadRegistry::global);
        let key = ScheduleKey::new(self.group, self.task_type, self.priority);
        Task::attach(registry, self.name, &key, self.single_loop)
    }
}
