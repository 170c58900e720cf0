//! Await the result of work scheduled on a task.
//!
//! The closure runs on the task's worker thread like any other queued job; its
//! return value travels back over a `tokio::sync::oneshot` channel.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::core::{SchedulerError, Task};

/// Submit `f` to the task's job queue and await its result.
///
/// The job only runs while the task is started.
///
/// # Errors
///
/// Returns the submission error, or `SchedulerError::JobDropped` if the job was
/// discarded before running (task destroyed or worker retired).
pub async fn run_job<F, R>(task: &Task, delay: Duration, f: F) -> Result<R, SchedulerError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let rx = submit(task, delay, f, false)?;
    receive(task, rx).await
}

/// Submit `f` to the task's message queue and await its result.
///
/// Messages run whatever the task's running state.
///
/// # Errors
///
/// Returns the submission error, or `SchedulerError::JobDropped` if the message was
/// discarded before running.
pub async fn run_message<F, R>(task: &Task, delay: Duration, f: F) -> Result<R, SchedulerError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let rx = submit(task, delay, f, true)?;
    receive(task, rx).await
}

fn submit<F, R>(
    task: &Task,
    delay: Duration,
    f: F,
    message: bool,
) -> Result<oneshot::Receiver<R>, SchedulerError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = move || {
        // The receiver may have been dropped by a cancelled caller.
        let _ = tx.send(f());
    };
    if message {
        task.submit_job_once(job, delay, false)?;
    } else {
        task.submit_job(job, delay, false)?;
    }
    Ok(rx)
}

async fn receive<R>(task: &Task, rx: oneshot::Receiver<R>) -> Result<R, SchedulerError> {
    rx.await.map_err(|_| {
        debug!(task = %task.name(), "Awaited job dropped before it ran");
        SchedulerError::JobDropped
    })
}
