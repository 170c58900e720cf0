//! Mutex implementation
//!
//! This module provides the mutual exclusion primitives the scheduler is built on,
//! re-exported from the `parking_lot` crate:
//!
//! - [`Mutex`] - the default lock, used for per-task and per-thread state
//! - [`FairMutex`] - hands the lock to waiters in arrival order; guards task job
//!   execution so a waiting `stop` is not starved by the worker loop
//!
//! # Features
//!
//! - No poisoning on panic
//! - Guards can be temporarily unlocked (`MutexGuard::unlocked`), which the worker
//!   loop uses to run jobs outside its own lock
//! - Compact memory footprint
//!
//! # Examples
//!
//! ```
//! use pipeline_scheduler::{Mutex, MutexGuard};
//!
//! let state = Mutex::new(0);
//! let mut guard = state.lock();
//! // Run work with the lock released, then hold it again.
//! MutexGuard::unlocked(&mut guard, || *state.lock() += 1);
//! assert_eq!(*guard, 1);
//! ```

pub use parking_lot::{FairMutex, FairMutexGuard, Mutex, MutexGuard};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mutex_guard_unlocked_releases_lock() {
        let mutex = Mutex::new(1);
        let mut guard = mutex.lock();
        let seen = MutexGuard::unlocked(&mut guard, || {
            // Another acquisition must succeed while the guard is unlocked
            *mutex.lock() += 1;
            mutex.is_locked()
        });
        assert!(!seen);
        assert_eq!(*guard, 2);
    }

    #[test]
    fn test_fair_mutex_concurrent_access() {
        let mutex = Arc::new(FairMutex::new(Vec::new()));
        let mut handles = vec![];

        for i in 0..8 {
            let mutex = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    mutex.lock().push(i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(mutex.lock().len(), 800);
    }

    #[test]
    fn test_fair_mutex_unlock_fair() {
        let mutex = FairMutex::new(0);
        let guard = mutex.lock();
        FairMutexGuard::unlock_fair(guard);
        assert!(!mutex.is_locked());
        assert!(mutex.try_lock().is_some());
    }
}
