//! Thread-pool registry: maps a schedule key to the worker thread that serves it.
//!
//! Tasks with the same group and type share one [`WorkerThread`]. `Global` tasks all
//! land in one shared group, and every `Singleton` task gets a private group of its
//! own. Workers are created on first use and retired when their last task detaches;
//! the shared global worker is kept for the life of the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::task::TaskCore;
use crate::core::{ScheduleKey, SchedulerError, TaskPriority, TaskType, ThreadStats, WorkerThread};
use crate::Mutex;

static GLOBAL: OnceLock<Arc<ThreadRegistry>> = OnceLock::new();

/// Mangles singleton group ids so no two singleton tasks share a worker.
static SINGLETON_SEQ: AtomicU64 = AtomicU64::new(1);

/// Registry of live worker threads, keyed by resolved group id.
pub struct ThreadRegistry {
    config: SchedulerConfig,
    groups: Mutex<HashMap<String, Vec<Arc<WorkerThread>>>>,
}

impl ThreadRegistry {
    /// Create an independent registry.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if `config` fails validation.
    pub fn new(config: SchedulerConfig) -> Result<Arc<Self>, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Arc::new(Self {
            config,
            groups: Mutex::new(HashMap::new()),
        }))
    }

    /// The process-wide registry, configured from the environment on first use.
    ///
    /// Falls back to the default configuration if the environment is invalid.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            let config = SchedulerConfig::from_env().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid scheduler environment - using defaults");
                SchedulerConfig::default()
            });
            Arc::new(Self {
                config,
                groups: Mutex::new(HashMap::new()),
            })
        }))
    }

    /// Configuration shared by every worker this registry creates.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Group id a task with `group` and `task_type` is scheduled in.
    fn resolve_group(&self, group: &str, task_type: TaskType) -> String {
        match task_type {
            TaskType::Global => self.config.global_group.clone(),
            TaskType::Singleton => {
                format!("{group}#{}", SINGLETON_SEQ.fetch_add(1, Ordering::Relaxed))
            }
            _ => group.to_string(),
        }
    }

    /// Drop workers whose loop is gone, e.g. after a job panicked.
    fn prune_exited(groups: &mut HashMap<String, Vec<Arc<WorkerThread>>>) {
        groups.retain(|group, threads| {
            threads.retain(|w| {
                let live = !w.is_exiting();
                if !live {
                    debug!(group = %group, thread = %w.name(), "Pruning exited worker thread");
                }
                live
            });
            !threads.is_empty()
        });
    }

    /// Look up a live worker in an already resolved group, or spawn one.
    fn find_or_spawn(
        &self,
        groups: &mut HashMap<String, Vec<Arc<WorkerThread>>>,
        group: &str,
        task_type: TaskType,
        priority: TaskPriority,
    ) -> Result<Arc<WorkerThread>, SchedulerError> {
        Self::prune_exited(groups);
        let threads = groups.entry(group.to_string()).or_default();
        if let Some(worker) = threads.iter().find(|w| w.task_type() == task_type) {
            return Ok(Arc::clone(worker));
        }

        let spawned = WorkerThread::spawn(group, task_type, priority, &self.config);
        match spawned {
            Ok(worker) => {
                threads.push(Arc::clone(&worker));
                Ok(worker)
            }
            Err(e) => {
                if threads.is_empty() {
                    groups.remove(group);
                }
                Err(e)
            }
        }
    }

    /// Return the worker serving `(group, task_type)`, creating it if needed.
    ///
    /// The priority only matters when a new thread is created.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ThreadSpawn` if the OS refuses a new thread.
    pub fn find_or_create_thread(
        &self,
        group: &str,
        task_type: TaskType,
        priority: TaskPriority,
    ) -> Result<Arc<WorkerThread>, SchedulerError> {
        let group = self.resolve_group(group, task_type);
        let mut groups = self.groups.lock();
        self.find_or_spawn(&mut groups, &group, task_type, priority)
    }

    /// Attach a task to the worker for `key`. The registry lock is held throughout,
    /// so a worker being retired is never handed out.
    pub(crate) fn attach(
        &self,
        key: &ScheduleKey,
        task: &Arc<TaskCore>,
    ) -> Result<Arc<WorkerThread>, SchedulerError> {
        let group = self.resolve_group(&key.group, key.task_type);
        let mut groups = self.groups.lock();
        let worker = self.find_or_spawn(&mut groups, &group, key.task_type, key.priority)?;
        worker.add_task(Arc::clone(task));
        Ok(worker)
    }

    /// Detach a task, retiring its worker if nothing else uses it.
    pub(crate) fn detach(&self, worker: &Arc<WorkerThread>, task: &Arc<TaskCore>) {
        let retired = {
            let mut groups = self.groups.lock();
            let remaining = worker.remove_task(task);
            debug!(thread = %worker.name(), task = %task.name(), remaining, "Task detached");

            if remaining > 0 || worker.task_type() == TaskType::Global {
                false
            } else {
                if let Some(threads) = groups.get_mut(worker.group()) {
                    threads.retain(|w| !Arc::ptr_eq(w, worker));
                    if threads.is_empty() {
                        groups.remove(worker.group());
                    }
                }
                worker.request_exit();
                true
            }
        };

        if retired {
            info!(thread = %worker.name(), "Retiring idle worker thread");
            worker.shutdown(self.config.exit_timeout());
        }
    }

    /// Remove every worker of `group` and ask each one to exit.
    ///
    /// Tasks still attached to those workers stop running. The shared global worker
    /// is kept even when `group` names its group. Returns the number of workers removed.
    pub fn destroy_group(&self, group: &str) -> usize {
        let removed = {
            let mut groups = self.groups.lock();
            let (kept, removed): (Vec<_>, Vec<_>) = groups
                .remove(group)
                .unwrap_or_default()
                .into_iter()
                .partition(|w| w.task_type() == TaskType::Global);
            if !kept.is_empty() {
                warn!(group, "Refusing to destroy the global worker thread");
                groups.insert(group.to_string(), kept);
            }
            removed
        };
        for worker in &removed {
            worker.shutdown(self.config.exit_timeout());
        }
        if !removed.is_empty() {
            info!(group, threads = removed.len(), "Group destroyed");
        }
        removed.len()
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        let mut groups = self.groups.lock();
        Self::prune_exited(&mut groups);
        groups.values().map(Vec::len).sum()
    }

    /// Number of live worker threads in `group`.
    #[must_use]
    pub fn group_thread_count(&self, group: &str) -> usize {
        let mut groups = self.groups.lock();
        Self::prune_exited(&mut groups);
        groups.get(group).map_or(0, Vec::len)
    }

    /// Statistics for every live worker thread, ordered by worker id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ThreadStats> {
        let workers: Vec<Arc<WorkerThread>> = {
            let mut groups = self.groups.lock();
            Self::prune_exited(&mut groups);
            groups.values().flatten().cloned().collect()
        };
        let mut stats: Vec<ThreadStats> = workers.iter().map(|w| w.stats()).collect();
        stats.sort_by_key(|s| s.id);
        stats
    }

    /// Retire every worker thread, including the global one.
    pub fn shutdown(&self) {
        let workers: Vec<Arc<WorkerThread>> = self
            .groups
            .lock()
            .drain()
            .flat_map(|(_, threads)| threads)
            .collect();
        if workers.is_empty() {
            return;
        }
        info!(threads = workers.len(), "Shutting down thread registry");
        for worker in &workers {
            worker.request_exit();
        }
        for worker in &workers {
            worker.shutdown(self.config.exit_timeout());
        }
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("config", &self.config)
            .field("threads", &self.thread_count())
            .finish()
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
