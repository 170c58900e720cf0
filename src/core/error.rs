//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread `{name}`: {source}")]
    ThreadSpawn {
        /// Name of the worker thread that could not be created.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The task's worker thread has been retired; nothing submitted to it will run.
    #[error("worker thread `{0}` has exited")]
    ThreadExited(String),
    /// Queued submission on a task using the single-loop discipline.
    #[error("task `{0}` runs a single periodic job and does not accept queued jobs")]
    SingleLoop(String),
    /// Periodic job registration on a task using the queued discipline.
    #[error("task `{0}` uses queued scheduling and cannot register a periodic job")]
    NotSingleLoop(String),
    /// The job was discarded before it ran, typically because its task was destroyed.
    #[error("job was dropped before it ran")]
    JobDropped,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
