//! Logical tasks: per-stage state machine, job queues and scheduling disciplines.
//!
//! A task runs in one of two disciplines:
//!
//! - **Single-loop**: one periodic job whose [`JobOutcome`] decides when it runs next.
//! - **Queued**: two timestamp-ordered queues of one-shot jobs. The message queue
//!   (control plane) runs in every state; the job queue (data plane) runs only while
//!   the task is [`RunningState::Started`]. At equal timestamps, and whenever a message
//!   is already due, messages run first.
//!
//! Lock order is: task job-exclusion lock, then the worker's job-state lock, then the
//! task state lock. Jobs themselves run with only the job-exclusion lock held.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::builders::TaskBuilder;
use crate::core::{
    JobOutcome, RunningState, ScheduleKey, SchedulerError, TaskPriority, TaskType,
    ThreadRegistry, WorkerThread,
};
use crate::util::clock;
use crate::{Condvar, FairMutex, FairMutexGuard, Mutex};

/// Sentinel published in `next_due` when nothing is scheduled.
const NOT_SCHEDULED: i64 = -1;

type OnceJob = Box<dyn FnOnce() + Send + 'static>;
type PeriodicJob = Box<dyn FnMut() -> JobOutcome + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Message,
    Job,
}

struct QueuedJob {
    seq: u64,
    job: OnceJob,
}

/// State guarded by the task lock.
struct TaskInner {
    state: RunningState,
    msg_queue: BTreeMap<i64, QueuedJob>,
    job_queue: BTreeMap<i64, QueuedJob>,
    /// Which queue holds the entry `next_due` refers to.
    top_is_job: bool,
    /// Sequence number of the job currently executing.
    in_flight: Option<u64>,
    next_seq: u64,
    /// Set once the task can no longer run anything (destroyed, or worker gone).
    orphaned: bool,
}

impl TaskInner {
    fn new() -> Self {
        Self {
            state: RunningState::Paused,
            msg_queue: BTreeMap::new(),
            job_queue: BTreeMap::new(),
            top_is_job: false,
            in_flight: None,
            next_seq: 0,
            orphaned: false,
        }
    }

    fn queue(&self, kind: QueueKind) -> &BTreeMap<i64, QueuedJob> {
        match kind {
            QueueKind::Message => &self.msg_queue,
            QueueKind::Job => &self.job_queue,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut BTreeMap<i64, QueuedJob> {
        match kind {
            QueueKind::Message => &mut self.msg_queue,
            QueueKind::Job => &mut self.job_queue,
        }
    }

    /// Insert at `at`, bumping the key past any collision. Returns `(key, seq)`.
    fn insert(&mut self, kind: QueueKind, at: i64, job: OnceJob) -> (i64, u64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let queue = self.queue_mut(kind);
        // Past the end of the clock the search wraps back below `at`.
        let key = (at..=i64::MAX)
            .find(|k| !queue.contains_key(k))
            .or_else(|| (i64::MIN..at).rev().find(|k| !queue.contains_key(k)))
            .unwrap_or(at);
        queue.insert(key, QueuedJob { seq, job });
        (key, seq)
    }

    /// Whether the entry inserted as `(key, seq)` has yet to finish running.
    fn is_pending(&self, kind: QueueKind, key: i64, seq: u64) -> bool {
        if self.orphaned {
            return false;
        }
        self.in_flight == Some(seq) || self.queue(kind).get(&key).is_some_and(|e| e.seq == seq)
    }

    /// Earliest eligible entry across both queues.
    fn top(&self, now: i64) -> Option<(i64, QueueKind)> {
        let msg = self.msg_queue.keys().next().copied();
        let job = if self.state == RunningState::Started {
            self.job_queue.keys().next().copied()
        } else {
            None
        };
        match (msg, job) {
            (None, None) => None,
            (Some(m), None) => Some((m, QueueKind::Message)),
            (None, Some(j)) => Some((j, QueueKind::Job)),
            (Some(m), Some(j)) if m <= j || m <= now => Some((m, QueueKind::Message)),
            (Some(_), Some(j)) => Some((j, QueueKind::Job)),
        }
    }
}

/// Entries taken from an orphaned task, dropped by the owner once it holds no locks.
pub(crate) struct OrphanedJobs {
    task: String,
    messages: BTreeMap<i64, QueuedJob>,
    jobs: BTreeMap<i64, QueuedJob>,
}

impl Drop for OrphanedJobs {
    fn drop(&mut self) {
        let discarded = self.messages.len() + self.jobs.len();
        if discarded > 0 {
            debug!(task = %self.task, discarded, "Worker gone - pending jobs discarded");
        }
    }
}

/// Scheduling state shared between a [`Task`] handle and its worker thread.
pub(crate) struct TaskCore {
    name: String,
    single_loop: bool,
    /// Earliest due timestamp, read lock-free by the worker loop.
    next_due: AtomicI64,
    inner: Mutex<TaskInner>,
    /// Serializes job execution against foreign start/stop/pause. Fair, so a
    /// waiting `stop` is handed the lock as soon as the current job returns.
    job_lock: FairMutex<()>,
    periodic: Mutex<Option<PeriodicJob>>,
    /// Notified after every executed job.
    reply: Condvar,
}

impl TaskCore {
    fn new(name: String, single_loop: bool) -> Self {
        Self {
            name,
            single_loop,
            next_due: AtomicI64::new(NOT_SCHEDULED),
            inner: Mutex::new(TaskInner::new()),
            job_lock: FairMutex::new(()),
            periodic: Mutex::new(None),
            reply: Condvar::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn next_due(&self) -> Option<i64> {
        let due = self.next_due.load(Ordering::Acquire);
        (due != NOT_SCHEDULED).then_some(due)
    }

    fn set_next_due(&self, due: Option<i64>) {
        self.next_due
            .store(due.unwrap_or(NOT_SCHEDULED), Ordering::Release);
    }

    /// Recompute `next_due` and `top_is_job` for the queued discipline.
    fn update_top(&self, inner: &mut TaskInner, now: i64) {
        if inner.state.is_transient() {
            // Due now so the loop visits and settles the transition.
            self.set_next_due(Some(now));
            return;
        }
        match inner.top(now) {
            Some((due, kind)) => {
                inner.top_is_job = kind == QueueKind::Job;
                self.set_next_due(Some(due));
            }
            None => self.set_next_due(None),
        }
    }

    fn settle(&self, inner: &mut TaskInner) {
        if inner.state.is_transient() {
            inner.state = inner.state.settled();
            debug!(task = %self.name, state = ?inner.state, "State transition settled");
        }
    }

    /// Release anyone waiting on this task; nothing queued will run any more.
    ///
    /// The pending entries are handed back so the caller can drop them after
    /// releasing its own locks: a discarded closure may own the last [`Task`] handle.
    pub(crate) fn orphan(&self) -> OrphanedJobs {
        let mut inner = self.inner.lock();
        inner.orphaned = true;
        self.set_next_due(None);
        self.reply.notify_all();
        OrphanedJobs {
            task: self.name.clone(),
            messages: std::mem::take(&mut inner.msg_queue),
            jobs: std::mem::take(&mut inner.job_queue),
        }
    }

    /// Run one due unit of work. Called by the worker loop without its lock held.
    pub(crate) fn handle_job(&self, guard_us: i64) {
        if self.single_loop {
            self.run_periodic();
        } else {
            self.run_queued(guard_us);
        }
    }

    fn run_periodic(&self) {
        let _exclusive = self.job_lock.lock();
        {
            let mut inner = self.inner.lock();
            self.settle(&mut inner);
            if inner.state != RunningState::Started {
                self.set_next_due(None);
                return;
            }
        }

        let Some(mut job) = self.periodic.lock().take() else {
            warn!(task = %self.name, "Single-loop task started without a periodic job");
            self.set_next_due(None);
            return;
        };

        trace!(task = %self.name, "Running periodic job");
        let outcome = job();

        {
            let mut slot = self.periodic.lock();
            // A job registered while this one ran replaces it.
            if slot.is_none() {
                *slot = Some(job);
            }
        }

        let inner = self.inner.lock();
        if inner.state == RunningState::Started {
            match outcome {
                JobOutcome::Reschedule(delay) => self.set_next_due(Some(clock::deadline_after(delay))),
                JobOutcome::Idle => self.set_next_due(None),
            }
        }
    }

    fn run_queued(&self, guard_us: i64) {
        let _exclusive = self.job_lock.lock();

        let (kind, entry) = {
            let mut inner = self.inner.lock();
            self.settle(&mut inner);
            let now = clock::now_us();
            self.update_top(&mut inner, now);

            match self.next_due() {
                Some(due) if due <= now.saturating_add(guard_us) => {}
                _ => return,
            }
            let kind = if inner.top_is_job {
                QueueKind::Job
            } else {
                QueueKind::Message
            };
            let Some((_, entry)) = inner.queue_mut(kind).pop_first() else {
                return;
            };
            inner.in_flight = Some(entry.seq);
            (kind, entry)
        };

        trace!(task = %self.name, queue = ?kind, seq = entry.seq, "Running queued job");
        (entry.job)();

        let mut inner = self.inner.lock();
        inner.in_flight = None;
        self.update_top(&mut inner, clock::now_us());
        self.reply.notify_all();
    }
}

/// A logical unit of pipeline work scheduled on a shared worker thread.
///
/// Dropping the task detaches it from its worker; the worker is retired when its
/// last task goes away (the shared global worker persists).
///
/// # Example
///
/// ```rust,no_run
/// use pipeline_scheduler::{JobOutcome, Task, TaskPriority, TaskType};
/// use std::time::Duration;
///
/// let render = Task::new("video-render", "pipeline-1", TaskType::Video, TaskPriority::High, true)?;
/// render.register_job(|| {
///     // render one frame
///     JobOutcome::Reschedule(Duration::from_millis(16))
/// })?;
/// render.start();
/// # Ok::<(), pipeline_scheduler::SchedulerError>(())
/// ```
pub struct Task {
    core: Arc<TaskCore>,
    worker: Arc<WorkerThread>,
    registry: Arc<ThreadRegistry>,
}

impl Task {
    /// Create a task on the process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ThreadSpawn` if a needed worker thread could not be created.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        task_type: TaskType,
        priority: TaskPriority,
        single_loop: bool,
    ) -> Result<Self, SchedulerError> {
        TaskBuilder::new(name)
            .group(group)
            .task_type(task_type)
            .priority(priority)
            .single_loop(single_loop)
            .build()
    }

    /// Start configuring a task.
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub(crate) fn attach(
        registry: Arc<ThreadRegistry>,
        name: String,
        key: &ScheduleKey,
        single_loop: bool,
    ) -> Result<Self, SchedulerError> {
        let core = Arc::new(TaskCore::new(name, single_loop));
        let worker = registry.attach(key, &core)?;
        debug!(
            task = %core.name,
            thread = %worker.name(),
            single_loop,
            "Task attached"
        );
        Ok(Self {
            core,
            worker,
            registry,
        })
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Name of the worker thread running this task.
    #[must_use]
    pub fn thread_name(&self) -> &str {
        self.worker.name()
    }

    /// Unique id of the worker thread running this task.
    #[must_use]
    pub fn thread_id(&self) -> u64 {
        self.worker.id()
    }

    /// The worker thread running this task.
    #[must_use]
    pub fn worker(&self) -> &Arc<WorkerThread> {
        &self.worker
    }

    /// Whether both tasks run on the same worker thread.
    #[must_use]
    pub fn shares_thread_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.worker, &other.worker)
    }

    /// Whether the task uses the single-loop discipline.
    #[must_use]
    pub fn is_single_loop(&self) -> bool {
        self.core.single_loop
    }

    /// Current running state.
    #[must_use]
    pub fn running_state(&self) -> RunningState {
        self.core.inner.lock().state
    }

    /// Whether the task is started.
    #[must_use]
    pub fn is_task_running(&self) -> bool {
        self.running_state() == RunningState::Started
    }

    /// Earliest due timestamp in microseconds on the crate clock, if anything is scheduled.
    #[must_use]
    pub fn next_due(&self) -> Option<i64> {
        self.core.next_due()
    }

    /// Whether the task has anything eligible to run.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.core.next_due().is_some()
    }

    /// Entries waiting in the job queue.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.core.inner.lock().job_queue.len()
    }

    /// Entries waiting in the message queue.
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.core.inner.lock().msg_queue.len()
    }

    /// Serialize against an in-flight job, unless we are that job's thread.
    fn exclusive(&self) -> Option<FairMutexGuard<'_, ()>> {
        if self.worker.is_running_in_self() {
            None
        } else {
            Some(self.core.job_lock.lock())
        }
    }

    /// Start the task: the periodic job becomes due now, or queued jobs become eligible.
    ///
    /// Starting an already started task re-arms it: a periodic job left idle
    /// becomes due now and the queued schedule is recomputed.
    pub fn start(&self) {
        let _exclusive = self.exclusive();
        let job_state = self.worker.lock_job_state();
        let mut inner = self.core.inner.lock();
        inner.state = RunningState::Started;
        let now = clock::now_us();
        if self.core.single_loop {
            self.core.set_next_due(Some(now));
        } else {
            self.core.update_top(&mut inner, now);
        }
        drop(inner);
        job_state.unlock(true);
        debug!(task = %self.core.name, "Task started");
    }

    /// Stop the task and wait until none of its jobs is running.
    ///
    /// On the task's own worker thread the stop is applied immediately.
    pub fn stop(&self) {
        self.halt(RunningState::Stopped, true);
    }

    /// Request a stop without waiting; the worker loop applies it.
    pub fn stop_async(&self) {
        self.halt(RunningState::Stopped, false);
    }

    /// Pause the task and wait until none of its jobs is running.
    ///
    /// On the task's own worker thread the pause is applied immediately.
    pub fn pause(&self) {
        self.halt(RunningState::Paused, true);
    }

    /// Request a pause without waiting; the worker loop applies it.
    pub fn pause_async(&self) {
        self.halt(RunningState::Paused, false);
    }

    fn halt(&self, target: RunningState, wait: bool) {
        let in_self = self.worker.is_running_in_self();
        let apply_now = wait || in_self;
        let _exclusive = if wait { self.exclusive() } else { None };

        let job_state = self.worker.lock_job_state();
        let mut inner = self.core.inner.lock();
        let current = inner.state;
        if current == target || (!apply_now && current.settled() == target) {
            return;
        }

        let now = clock::now_us();
        if apply_now {
            inner.state = target;
            if self.core.single_loop {
                self.core.set_next_due(None);
            } else {
                self.core.update_top(&mut inner, now);
            }
        } else {
            inner.state = match target {
                RunningState::Stopped => RunningState::Stopping,
                _ => RunningState::Pausing,
            };
            self.core.set_next_due(Some(now));
        }
        let state = inner.state;
        drop(inner);
        job_state.unlock(true);
        debug!(task = %self.core.name, state = ?state, "Task halted");
    }

    /// Install the periodic job of a single-loop task.
    ///
    /// If the task is already started the job becomes due immediately.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotSingleLoop` for queued tasks.
    pub fn register_job<F>(&self, job: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> JobOutcome + Send + 'static,
    {
        if !self.core.single_loop {
            return Err(SchedulerError::NotSingleLoop(self.core.name.clone()));
        }
        *self.core.periodic.lock() = Some(Box::new(job));

        let job_state = self.worker.lock_job_state();
        let inner = self.core.inner.lock();
        let arm = inner.state == RunningState::Started && self.core.next_due().is_none();
        if arm {
            self.core.set_next_due(Some(clock::now_us()));
        }
        drop(inner);
        job_state.unlock(arm);
        Ok(())
    }

    /// Queue a data-plane job to run `delay` from now while the task is started.
    ///
    /// With `wait`, blocks until the job has run. Waiting is skipped on the task's own
    /// worker thread, where it could never complete.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SingleLoop` for single-loop tasks and
    /// `SchedulerError::ThreadExited` if the worker has been retired.
    pub fn submit_job<F>(&self, job: F, delay: Duration, wait: bool) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(QueueKind::Job, Box::new(job), delay, wait)
    }

    /// Queue a control-plane message to run `delay` from now, whatever the task state.
    ///
    /// With `wait`, blocks until the message has run. Waiting is skipped on the task's
    /// own worker thread.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SingleLoop` for single-loop tasks and
    /// `SchedulerError::ThreadExited` if the worker has been retired.
    pub fn submit_job_once<F>(&self, job: F, delay: Duration, wait: bool) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(QueueKind::Message, Box::new(job), delay, wait)
    }

    fn submit(
        &self,
        kind: QueueKind,
        job: OnceJob,
        delay: Duration,
        wait: bool,
    ) -> Result<(), SchedulerError> {
        if self.core.single_loop {
            return Err(SchedulerError::SingleLoop(self.core.name.clone()));
        }
        if self.worker.is_exiting() {
            return Err(SchedulerError::ThreadExited(self.worker.name().to_string()));
        }

        let job_state = self.worker.lock_job_state();
        let mut inner = self.core.inner.lock();
        if inner.orphaned {
            // The worker exited after the check above.
            return Err(SchedulerError::ThreadExited(self.worker.name().to_string()));
        }
        let (key, seq) = inner.insert(kind, clock::deadline_after(delay), job);
        let before = self.core.next_due();
        self.core.update_top(&mut inner, clock::now_us());
        let moved = self.core.next_due() != before;
        drop(inner);
        job_state.unlock(moved);
        trace!(task = %self.core.name, queue = ?kind, key, seq, "Job submitted");

        if wait {
            if self.worker.is_running_in_self() {
                debug!(task = %self.core.name, "Not waiting for a job submitted from its own worker");
            } else {
                let mut inner = self.core.inner.lock();
                self.core
                    .reply
                    .wait_while(&mut inner, |inner| inner.is_pending(kind, key, seq));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.core.name)
            .field("thread", &self.worker.name())
            .field("single_loop", &self.core.single_loop)
            .finish_non_exhaustive()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.registry.detach(&self.worker, &self.core);

        let _exclusive = self.exclusive();
        let (messages, jobs) = {
            let mut inner = self.core.inner.lock();
            inner.state = RunningState::Stopped;
            inner.orphaned = true;
            self.core.set_next_due(None);
            self.core.reply.notify_all();
            (
                std::mem::take(&mut inner.msg_queue),
                std::mem::take(&mut inner.job_queue),
            )
        };
        let periodic = self.core.periodic.lock().take();
        // Dropped outside the task lock: captured values may run arbitrary drop code.
        let discarded = messages.len() + jobs.len();
        drop((messages, jobs, periodic));

        debug!(task = %self.core.name, discarded, "Task destroyed");
    }
}
