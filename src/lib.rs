//! # Pipeline Scheduler
//!
//! A cooperative multi-task scheduler for media-processing pipelines.
//!
//! Every pipeline stage (source, filter, codec adapter, sink) runs as a logical
//! [`Task`]. Instead of giving each stage its own OS thread, tasks are multiplexed
//! onto a small pool of shared worker threads keyed by pipeline group, task type
//! and priority. Each task keeps independent start/stop/pause control and can carry
//! either one periodic job or any number of timestamp-ordered one-shot jobs.
//!
//! ## Core Problem Solved
//!
//! A media pipeline may contain dozens of stages. One thread per stage exhausts
//! thread resources quickly and makes cross-stage ordering hard to reason about:
//!
//! - **Bounded threads**: one worker per distinct `(group, task type)` pair
//! - **Affinity**: stages of the same pipeline and media type share a thread
//! - **Isolation**: [`TaskType::Singleton`] opts a task out of sharing entirely
//! - **Ordering**: jobs on one worker run in timestamp order across all its tasks
//!
//! ## Key Features
//!
//! - **Two scheduling disciplines**: single-loop periodic jobs that return their own
//!   next delay, or queued one-shot jobs split into a control-plane message queue and
//!   a data-plane job queue
//! - **Self-thread reentrancy**: task operations invoked from the task's own worker
//!   thread never block on it
//! - **Thread-pool registry**: worker threads are created on demand and retired when
//!   their last task goes away
//! - **Async bridge**: with the `tokio-runtime` feature, jobs can be awaited
//!
//! ## Example
//!
//! ```rust,no_run
//! use pipeline_scheduler::{Task, TaskPriority, TaskType};
//! use std::time::Duration;
//!
//! let task = Task::new("audio-decoder", "pipeline-1", TaskType::Audio, TaskPriority::Normal, false)?;
//! task.start();
//! task.submit_job(|| println!("decode one frame"), Duration::ZERO, true)?;
//! task.stop();
//! # Ok::<(), pipeline_scheduler::SchedulerError>(())
//! ```
//!
//! For complete examples, see:
//! - `tests/task_scheduling_test.rs` - Scheduling disciplines and ordering
//! - `tests/thread_registry_test.rs` - Thread sharing and teardown

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Mutual exclusion primitives.
pub mod mutex;
/// Condition variables with predicate and timed waits.
pub mod condvar;
/// Core scheduling abstractions: tasks, worker threads and the thread registry.
pub mod core;
/// Configuration models for the scheduler.
pub mod config;
/// Builders to construct tasks against a registry.
pub mod builders;
/// Runtime adapters bridging scheduler jobs into async code.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::TaskBuilder;
pub use crate::condvar::Condvar;
pub use crate::config::SchedulerConfig;
pub use crate::core::{
    JobOutcome, RunningState, SchedulerError, Task, TaskPriority, TaskType, ThreadRegistry,
    ThreadStats, WorkerThread,
};
pub use crate::mutex::{FairMutex, FairMutexGuard, Mutex, MutexGuard};
