//! Integration tests for the thread registry
//!
//! Covers how tasks are mapped onto worker threads (group affinity, task type,
//! the shared global group, singletons) and how workers are retired once their
//! last task is gone.

use pipeline_scheduler::{
    SchedulerConfig, Task, TaskBuilder, TaskPriority, TaskType, ThreadRegistry,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn registry() -> Arc<ThreadRegistry> {
    ThreadRegistry::new(
        SchedulerConfig::default()
            .with_thread_priority(false)
            .with_global_group("shared-global"),
    )
    .unwrap()
}

fn task(registry: &Arc<ThreadRegistry>, name: &str, group: &str, task_type: TaskType) -> Task {
    TaskBuilder::new(name)
        .group(group)
        .task_type(task_type)
        .registry(Arc::clone(registry))
        .build()
        .unwrap()
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_same_group_and_type_share_a_worker() {
    let registry = registry();
    let decoder = task(&registry, "decoder", "pipeline-1", TaskType::Audio);
    let resampler = task(&registry, "resampler", "pipeline-1", TaskType::Audio);
    let video = task(&registry, "video", "pipeline-1", TaskType::Video);
    let other = task(&registry, "decoder", "pipeline-2", TaskType::Audio);

    assert!(decoder.shares_thread_with(&resampler));
    assert_eq!(decoder.thread_id(), resampler.thread_id());
    assert!(!decoder.shares_thread_with(&video));
    assert!(!decoder.shares_thread_with(&other));

    assert_eq!(decoder.thread_name(), "pipe-pipeline-1-audio");
    assert_eq!(video.thread_name(), "pipe-pipeline-1-video");
    assert_eq!(registry.group_thread_count("pipeline-1"), 2);
    assert_eq!(registry.thread_count(), 3);
}

#[test]
fn test_first_priority_wins() {
    let registry = registry();
    let first = TaskBuilder::new("first")
        .group("prio")
        .task_type(TaskType::Subtitle)
        .priority(TaskPriority::Low)
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();
    let second = TaskBuilder::new("second")
        .group("prio")
        .task_type(TaskType::Subtitle)
        .priority(TaskPriority::Highest)
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();

    assert!(first.shares_thread_with(&second));
    assert_eq!(second.worker().priority(), TaskPriority::Low);
}

#[test]
fn test_singletons_never_share() {
    let registry = registry();
    let a = task(&registry, "a", "pipeline-1", TaskType::Singleton);
    let b = task(&registry, "b", "pipeline-1", TaskType::Singleton);

    assert!(!a.shares_thread_with(&b));
    assert_ne!(a.worker().group(), b.worker().group());
    assert_eq!(registry.group_thread_count("pipeline-1"), 0);
    assert_eq!(registry.thread_count(), 2);

    drop(a);
    drop(b);
    assert_eq!(registry.thread_count(), 0);
}

#[test]
fn test_global_tasks_share_regardless_of_group() {
    let registry = registry();
    let a = task(&registry, "clock", "pipeline-1", TaskType::Global);
    let b = task(&registry, "stats", "pipeline-2", TaskType::Global);

    assert!(a.shares_thread_with(&b));
    assert_eq!(a.worker().group(), "shared-global");
    assert_eq!(registry.group_thread_count("pipeline-1"), 0);
    assert_eq!(registry.group_thread_count("shared-global"), 1);

    let worker = Arc::clone(a.worker());
    drop(a);
    drop(b);
    // The global worker outlives its tasks.
    assert_eq!(registry.group_thread_count("shared-global"), 1);
    assert!(!worker.is_exiting());

    let c = task(&registry, "again", "pipeline-3", TaskType::Global);
    assert_eq!(c.thread_id(), worker.id());
}

#[test]
fn test_last_task_retires_worker() {
    let registry = registry();
    let a = task(&registry, "a", "teardown", TaskType::Video);
    let b = task(&registry, "b", "teardown", TaskType::Video);
    let worker = Arc::clone(a.worker());
    let old_id = a.thread_id();

    drop(a);
    assert_eq!(registry.group_thread_count("teardown"), 1);
    assert_eq!(worker.task_count(), 1);

    drop(b);
    assert_eq!(registry.group_thread_count("teardown"), 0);
    assert!(worker.has_exited());

    let c = task(&registry, "c", "teardown", TaskType::Video);
    assert_ne!(c.thread_id(), old_id);
    assert_eq!(registry.group_thread_count("teardown"), 1);
}

#[test]
fn test_task_dropped_on_its_own_worker() {
    let registry = registry();
    let t = task(&registry, "self-drop", "own", TaskType::Audio);
    let worker = Arc::clone(t.worker());
    let (tx, rx) = mpsc::channel();

    t.start();
    let holder = Arc::new(t);
    let inner = Arc::clone(&holder);
    holder
        .submit_job_once(
            move || {
                drop(inner);
                tx.send(()).unwrap();
            },
            Duration::from_millis(10),
            false,
        )
        .unwrap();
    // The queued closure now holds the last reference.
    drop(holder);

    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(registry.group_thread_count("own"), 0);
    assert!(wait_until(Duration::from_secs(2), || worker.has_exited()));
}

#[test]
fn test_destroy_group_drops_last_task_handle_held_by_pending_job() {
    let registry = ThreadRegistry::new(
        SchedulerConfig::default()
            .with_thread_priority(false)
            .with_exit_timeout_ms(300),
    )
    .unwrap();
    // Paused, so the job stays queued until the worker exits.
    let holder = Arc::new(task(&registry, "held", "pg", TaskType::Audio));
    let worker = Arc::clone(holder.worker());
    let inner = Arc::clone(&holder);
    holder
        .submit_job(
            move || {
                let _keep = &inner;
            },
            Duration::ZERO,
            false,
        )
        .unwrap();
    drop(holder);

    let (tx, rx) = mpsc::channel();
    let destroyer = Arc::clone(&registry);
    thread::spawn(move || tx.send(destroyer.destroy_group("pg")).unwrap());

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    assert!(worker.has_exited());
    assert_eq!(registry.group_thread_count("pg"), 0);
}

#[test]
fn test_non_global_worker_in_global_group_is_retired() {
    let registry = registry();
    let global = task(&registry, "clock", "anything", TaskType::Global);
    let video = task(&registry, "render", "shared-global", TaskType::Video);
    let video_worker = Arc::clone(video.worker());
    assert!(!global.shares_thread_with(&video));
    assert_eq!(registry.group_thread_count("shared-global"), 2);

    drop(video);
    assert!(video_worker.has_exited());
    assert_eq!(registry.group_thread_count("shared-global"), 1);

    let again = task(&registry, "render", "shared-global", TaskType::Video);
    assert_eq!(registry.destroy_group("shared-global"), 1);
    assert!(again.worker().has_exited());
    assert!(!global.worker().is_exiting());
    assert_eq!(registry.group_thread_count("shared-global"), 1);
}

#[test]
fn test_snapshot_reports_workers() {
    let registry = registry();
    let a = task(&registry, "a", "snap", TaskType::Audio);
    let _b = task(&registry, "b", "snap", TaskType::Audio);
    let _v = task(&registry, "v", "snap", TaskType::Video);

    a.start();
    a.submit_job(|| {}, Duration::ZERO, true).unwrap();

    let stats = registry.snapshot();
    assert_eq!(stats.len(), 2);
    assert!(stats.windows(2).all(|w| w[0].id < w[1].id));

    let audio = stats
        .iter()
        .find(|s| s.task_type == TaskType::Audio)
        .unwrap();
    assert_eq!(audio.group, "snap");
    assert_eq!(audio.task_count, 2);
    assert!(audio.jobs_dispatched >= 1);
    assert!(!audio.exiting);

    let json = serde_json::to_string(audio).unwrap();
    assert!(json.contains("\"task_type\":\"audio\""));
}

#[test]
fn test_registry_drop_retires_all_workers() {
    let registry = registry();
    let worker = registry
        .find_or_create_thread("scoped", TaskType::Video, TaskPriority::Normal)
        .unwrap();
    let global = registry
        .find_or_create_thread("any", TaskType::Global, TaskPriority::Normal)
        .unwrap();

    drop(registry);
    assert!(worker.has_exited());
    assert!(global.has_exited());
}

#[test]
fn test_process_wide_registry() {
    let registry = ThreadRegistry::global();
    assert!(Arc::ptr_eq(&registry, &ThreadRegistry::global()));

    let task = Task::new(
        "global-registry",
        "process-wide-test",
        TaskType::Subtitle,
        TaskPriority::Normal,
        false,
    )
    .unwrap();
    assert_eq!(registry.group_thread_count("process-wide-test"), 1);

    task.start();
    task.submit_job(|| {}, Duration::ZERO, true).unwrap();

    drop(task);
    assert_eq!(registry.group_thread_count("process-wide-test"), 0);
}
