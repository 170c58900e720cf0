//! Worker threads: one OS thread running the scheduling loop over the tasks it owns.
//!
//! # Design Principles
//!
//! - **No polling**: the loop sleeps on a `Condvar`, either untimed when nothing is
//!   scheduled or until the earliest task deadline
//! - **Lock-free deadline scan**: every task publishes its next due timestamp in an
//!   atomic, so the scan never touches task locks
//! - **Jobs run unlocked**: the job-state lock is released around every job, so jobs
//!   may freely call back into tasks, the registry, or this worker
//! - **Self-thread bypass**: operations issued from the worker's own thread skip the
//!   job-state lock and never wait on the loop

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, error, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::core::task::{OrphanedJobs, TaskCore};
use crate::core::{SchedulerError, TaskPriority, TaskType};
use crate::util::clock;
use crate::{Condvar, Mutex, MutexGuard};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// State guarded by the job-state lock.
pub(crate) struct ThreadState {
    tasks: Vec<Arc<TaskCore>>,
}

/// Internal counters for worker statistics (lock-free).
#[derive(Debug, Default)]
struct ThreadCounters {
    jobs_dispatched: AtomicU64,
    idle_waits: AtomicU64,
    timed_waits: AtomicU64,
}

/// Point-in-time statistics for one worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    /// Unique worker id.
    pub id: u64,
    /// Worker thread name.
    pub name: String,
    /// Resolved group the worker serves.
    pub group: String,
    /// Task type the worker serves.
    pub task_type: TaskType,
    /// Priority the worker was created with.
    pub priority: TaskPriority,
    /// Tasks currently attached.
    pub task_count: usize,
    /// Times the loop handed a due task to `handle_job`.
    pub jobs_dispatched: u64,
    /// Untimed sleeps (nothing scheduled).
    pub idle_waits: u64,
    /// Deadline sleeps.
    pub timed_waits: u64,
    /// Whether the worker has been asked to exit.
    pub exiting: bool,
}

/// One OS thread shared by every task with the same `(group, task type)` key.
///
/// Worker threads are created by the [`ThreadRegistry`](crate::ThreadRegistry) and
/// retired when their last task is dropped (except the shared global worker).
pub struct WorkerThread {
    id: u64,
    name: String,
    group: String,
    task_type: TaskType,
    priority: TaskPriority,
    guard_us: i64,
    state: Mutex<ThreadState>,
    /// Wakes the loop early and signals completion of an exit request.
    cond: Condvar,
    os_thread: OnceLock<ThreadId>,
    handle: Mutex<Option<JoinHandle<()>>>,
    exiting: AtomicBool,
    exited: AtomicBool,
    counters: ThreadCounters,
}

/// Held job-state lock, or the self-thread bypass.
pub(crate) struct JobStateGuard<'a> {
    worker: &'a WorkerThread,
    guard: Option<MutexGuard<'a, ThreadState>>,
}

impl JobStateGuard<'_> {
    /// Release the lock, waking the loop if the scheduling order changed.
    pub(crate) fn unlock(self, notify: bool) {
        if notify && self.guard.is_some() {
            self.worker.cond.notify_all();
        }
    }
}

impl WorkerThread {
    /// Spawn a worker thread for `group`/`task_type`.
    pub(crate) fn spawn(
        group: &str,
        task_type: TaskType,
        priority: TaskPriority,
        config: &SchedulerConfig,
    ) -> Result<Arc<Self>, SchedulerError> {
        let name = format!("{}-{}-{}", config.thread_name_prefix, group, task_type).replace('\0', "");
        let worker = Arc::new(Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.clone(),
            group: group.to_string(),
            task_type,
            priority,
            guard_us: i64::try_from(config.guard_interval_us).unwrap_or(i64::MAX),
            state: Mutex::new(ThreadState { tasks: Vec::new() }),
            cond: Condvar::new(),
            os_thread: OnceLock::new(),
            handle: Mutex::new(None),
            exiting: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            counters: ThreadCounters::default(),
        });

        let runner = Arc::clone(&worker);
        let apply_priority = config.apply_thread_priority;
        let handle = thread::Builder::new()
            .name(name.clone())
            .stack_size(config.thread_stack_size)
            .spawn(move || {
                if apply_priority {
                    apply_os_priority(&runner.name, runner.priority);
                }
                runner.run();
            })
            .map_err(|source| {
                error!(thread = %name, error = %source, "Failed to spawn worker thread");
                SchedulerError::ThreadSpawn {
                    name: name.clone(),
                    source,
                }
            })?;

        let _ = worker.os_thread.set(handle.thread().id());
        *worker.handle.lock() = Some(handle);

        info!(
            thread = %worker.name,
            id = worker.id,
            task_type = %task_type,
            priority = ?priority,
            "Worker thread spawned"
        );
        Ok(worker)
    }

    /// Unique worker id; a retired and re-created worker gets a new one.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Worker thread name, derived from the group and task type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved group this worker serves.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Task type this worker serves.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Priority the worker was created with.
    #[must_use]
    pub const fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Number of tasks currently attached.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Whether the worker has been asked to exit.
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Whether the worker loop has finished.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Whether the calling code is running on this worker's OS thread.
    #[must_use]
    pub fn is_running_in_self(&self) -> bool {
        self.os_thread.get() == Some(&thread::current().id())
    }

    /// Snapshot of the worker's statistics.
    #[must_use]
    pub fn stats(&self) -> ThreadStats {
        ThreadStats {
            id: self.id,
            name: self.name.clone(),
            group: self.group.clone(),
            task_type: self.task_type,
            priority: self.priority,
            task_count: self.task_count(),
            jobs_dispatched: self.counters.jobs_dispatched.load(Ordering::Relaxed),
            idle_waits: self.counters.idle_waits.load(Ordering::Relaxed),
            timed_waits: self.counters.timed_waits.load(Ordering::Relaxed),
            exiting: self.is_exiting(),
        }
    }

    /// Take the job-state lock so a task can change its schedule atomically with
    /// the loop's view of it. Skipped on the worker's own thread.
    pub(crate) fn lock_job_state(&self) -> JobStateGuard<'_> {
        let guard = if self.is_running_in_self() {
            None
        } else {
            Some(self.state.lock())
        };
        JobStateGuard {
            worker: self,
            guard,
        }
    }

    /// Attach a task; returns the new task count.
    pub(crate) fn add_task(&self, task: Arc<TaskCore>) -> usize {
        let mut state = self.state.lock();
        if self.has_exited() {
            // Lost a race with a dying loop: the task can never run here.
            let discarded = task.orphan();
            drop(state);
            drop(discarded);
            return 0;
        }
        state.tasks.push(task);
        self.cond.notify_all();
        state.tasks.len()
    }

    /// Detach a task; returns the remaining task count.
    ///
    /// Safe to call after the loop exited, including from the exit path itself
    /// once it has released the job-state lock.
    pub(crate) fn remove_task(&self, task: &Arc<TaskCore>) -> usize {
        let mut state = self.state.lock();
        state.tasks.retain(|owned| !Arc::ptr_eq(owned, task));
        self.cond.notify_all();
        state.tasks.len()
    }

    /// Flag the loop to exit and wake it. Returns `false` if already requested.
    pub(crate) fn request_exit(&self) -> bool {
        if self.exiting.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _state = self.state.lock();
        self.cond.notify_all();
        true
    }

    /// Ask the loop to exit, wait up to `timeout` for it, then join the OS thread.
    ///
    /// From the worker's own thread this only flags the loop; it exits once the
    /// current job returns. A worker that misses the timeout is detached.
    pub(crate) fn shutdown(&self, timeout: Duration) {
        if self.request_exit() {
            debug!(thread = %self.name, "Worker exit requested");
        }
        if self.is_running_in_self() {
            return;
        }

        let exited = {
            let mut state = self.state.lock();
            !self
                .cond
                .wait_while_for(&mut state, |_| !self.exited.load(Ordering::Acquire), timeout)
                .timed_out()
        };

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if exited {
            if handle.join().is_err() {
                warn!(thread = %self.name, "Worker thread panicked");
            } else {
                debug!(thread = %self.name, "Worker joined successfully");
            }
        } else {
            warn!(
                thread = %self.name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Worker did not exit within timeout - detaching"
            );
        }
    }

    /// The scheduling loop.
    fn run(self: Arc<Self>) {
        let _exit = ExitSignal {
            worker: self.as_ref(),
        };
        debug!(thread = %self.name, "Worker loop started");

        let mut state = self.state.lock();
        loop {
            if self.exiting.load(Ordering::Acquire) {
                break;
            }

            let next = state
                .tasks
                .iter()
                .filter_map(|task| task.next_due().map(|due| (due, task)))
                .min_by_key(|(due, _)| *due)
                .map(|(due, task)| (due, Arc::clone(task)));

            let Some((due, task)) = next else {
                self.counters.idle_waits.fetch_add(1, Ordering::Relaxed);
                self.cond.wait(&mut state);
                continue;
            };

            let remaining = due.saturating_sub(clock::now_us());
            if remaining > self.guard_us {
                self.counters.timed_waits.fetch_add(1, Ordering::Relaxed);
                let sleep_us = remaining.saturating_add(self.guard_us);
                let timeout = Duration::from_micros(u64::try_from(sleep_us).unwrap_or(u64::MAX));
                self.cond.wait_for(&mut state, timeout);
                continue;
            }

            self.counters.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
            trace!(thread = %self.name, task = %task.name(), due, "Dispatching due task");
            let guard_us = self.guard_us;
            MutexGuard::unlocked(&mut state, || task.handle_job(guard_us));
        }
        drop(state);
    }
}

impl fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .field("priority", &self.priority)
            .field("exiting", &self.is_exiting())
            .finish_non_exhaustive()
    }
}

/// Marks the worker exited when its loop ends, including by a panicking job.
struct ExitSignal<'a> {
    worker: &'a WorkerThread,
}

impl Drop for ExitSignal<'_> {
    fn drop(&mut self) {
        let worker = self.worker;
        if thread::panicking() {
            error!(thread = %worker.name, "Job panicked - worker thread terminated");
        }
        worker.exiting.store(true, Ordering::Release);

        let (tasks, discarded) = {
            let mut state = worker.state.lock();
            let tasks = std::mem::take(&mut state.tasks);
            // Anyone still attached will never run again; release their waiters.
            let discarded: Vec<OrphanedJobs> = tasks.iter().map(|task| task.orphan()).collect();
            worker.exited.store(true, Ordering::Release);
            worker.cond.notify_all();
            (tasks, discarded)
        };
        info!(thread = %worker.name, id = worker.id, "Worker thread exited");

        // Discarded closures may own the last handle to their task, whose drop
        // detaches through this worker's lock.
        drop(discarded);
        drop(tasks);
    }
}

/// OS priority for a task priority; `None` leaves the OS default.
fn os_priority(priority: TaskPriority) -> Option<ThreadPriority> {
    let crossplatform = |value: u8| {
        ThreadPriorityValue::try_from(value)
            .ok()
            .map(ThreadPriority::Crossplatform)
    };
    match priority {
        TaskPriority::Low => Some(ThreadPriority::Min),
        TaskPriority::Normal => None,
        TaskPriority::Middle => crossplatform(60),
        TaskPriority::High => crossplatform(80),
        TaskPriority::Highest => Some(ThreadPriority::Max),
    }
}

/// Apply the OS priority on the current thread; the OS may refuse without privileges.
fn apply_os_priority(name: &str, priority: TaskPriority) {
    let Some(os) = os_priority(priority) else {
        return;
    };
    if let Err(e) = set_current_thread_priority(os) {
        debug!(thread = %name, priority = ?priority, error = ?e, "Thread priority not set");
    }
}
