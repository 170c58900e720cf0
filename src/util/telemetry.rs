//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
///
/// Scheduler lifecycle events (thread spawn/exit, task attach/detach) log at
/// `info`/`debug`; per-job dispatch logs at `trace`, so
/// `RUST_LOG=pipeline_scheduler=trace` shows every job the worker loops run.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
