//! Core scheduling abstractions: tasks, worker threads and the thread registry.

pub mod error;
pub mod registry;
pub mod task;
pub mod types;
pub mod worker_thread;

pub use error::{AppResult, SchedulerError};
pub use registry::ThreadRegistry;
pub use task::Task;
pub use types::{JobOutcome, RunningState, ScheduleKey, TaskPriority, TaskType};
pub use worker_thread::{ThreadStats, WorkerThread};
