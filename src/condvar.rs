//! Condition variable implementation.
//!
//! This module provides the condition variable the scheduler uses for every blocking
//! wait: the worker loop's deadline sleep, exit acknowledgement, and job-reply waits.
//! Besides plain and predicate waits it supports timed waits, reporting whether the
//! wait ended by timeout.

use std::time::{Duration, Instant};

use crate::MutexGuard;

pub use parking_lot::WaitTimeoutResult;

/// A condition variable.
///
/// Condition variables represent the ability to block a thread such that
/// it consumes no CPU time while waiting for an event to occur. Unlike
/// `std::sync::Condvar`, this type does not implement poisoning.
///
/// # Examples
///
/// ```
/// use pipeline_scheduler::{Mutex, Condvar};
/// use std::sync::Arc;
/// use std::thread;
///
/// let pair = Arc::new((Mutex::new(false), Condvar::new()));
/// let pair2 = Arc::clone(&pair);
///
/// thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     *lock.lock() = true;
///     cvar.notify_one();
/// });
///
/// let (lock, cvar) = &*pair;
/// let mut started = lock.lock();
/// cvar.wait_while(&mut started, |started| !*started);
/// ```
#[derive(Debug, Default)]
pub struct Condvar {
    inner: parking_lot::Condvar,
}

impl Condvar {
    /// Creates a new condition variable.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::Condvar::new(),
        }
    }

    /// Blocks the current thread until this condition variable receives a notification.
    ///
    /// The mutex behind `guard` is atomically released while waiting and re-acquired
    /// before returning. Spurious wakeups are possible, so callers re-check their
    /// condition in a loop or use [`Condvar::wait_while`].
    #[inline]
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.inner.wait(guard);
    }

    /// Blocks the current thread while `condition` returns `true`.
    ///
    /// ```
    /// use pipeline_scheduler::{Mutex, Condvar};
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let pair = Arc::new((Mutex::new(0), Condvar::new()));
    /// let pair2 = Arc::clone(&pair);
    ///
    /// thread::spawn(move || {
    ///     let (lock, cvar) = &*pair2;
    ///     *lock.lock() = 10;
    ///     cvar.notify_one();
    /// });
    ///
    /// let (lock, cvar) = &*pair;
    /// let mut count = lock.lock();
    /// cvar.wait_while(&mut count, |c| *c < 10);
    /// assert_eq!(*count, 10);
    /// ```
    #[inline]
    pub fn wait_while<T, F>(&self, guard: &mut MutexGuard<'_, T>, condition: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        self.inner.wait_while(guard, condition);
    }

    /// Waits on this condition variable for a notification, timing out after `timeout`.
    ///
    /// ```
    /// use pipeline_scheduler::{Mutex, Condvar};
    /// use std::time::Duration;
    ///
    /// let lock = Mutex::new(());
    /// let cvar = Condvar::new();
    /// let mut guard = lock.lock();
    /// assert!(cvar.wait_for(&mut guard, Duration::from_millis(5)).timed_out());
    /// ```
    #[inline]
    pub fn wait_for<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> WaitTimeoutResult {
        self.inner.wait_for(guard, timeout)
    }

    /// Waits on this condition variable until notified or until `deadline` passes.
    #[inline]
    pub fn wait_until<T>(&self, guard: &mut MutexGuard<'_, T>, deadline: Instant) -> WaitTimeoutResult {
        self.inner.wait_until(guard, deadline)
    }

    /// Blocks while `condition` returns `true`, giving up after `timeout`.
    ///
    /// The returned result reports a timeout only if the condition still held when
    /// the time ran out.
    #[inline]
    pub fn wait_while_for<T, F>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        condition: F,
        timeout: Duration,
    ) -> WaitTimeoutResult
    where
        F: FnMut(&mut T) -> bool,
    {
        self.inner.wait_while_for(guard, condition, timeout)
    }

    /// Wakes up one blocked thread on this condvar.
    ///
    /// Calls to `notify_one` are not buffered in any way.
    #[inline]
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes up all blocked threads on this condvar.
    ///
    /// Calls to `notify_all` are not buffered in any way.
    #[inline]
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}
