//! Conditional process-wide serialization lock.
//!
//! When engaged, one thread at a time may be inside a forwarded native call.
//! When not engaged, [`SerializationLock::acquire`] returns an empty guard
//! and costs one relaxed load. The decision is taken once, while the process
//! initializes MPI.
//!
//! The mutex is re-entrant for its owner thread: a native library that calls
//! its own public (and therefore intercepted) entry points from inside a
//! locked call must not deadlock on itself.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

#[derive(Debug, Default)]
pub struct SerializationLock {
    engaged: AtomicBool,
    mutex: ReentrantMutex<()>,
}

/// Held for the duration of one forwarded call.
#[must_use = "the lock is released when the guard is dropped"]
pub struct LockGuard<'a> {
    inner: Option<ReentrantMutexGuard<'a, ()>>,
}

impl LockGuard<'_> {
    /// Whether this guard actually holds the mutex.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }
}

impl SerializationLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
            mutex: ReentrantMutex::new(()),
        }
    }

    /// Set the process-wide decision.
    pub fn engage(&self, engaged: bool) {
        self.engaged.store(engaged, Ordering::Release);
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> LockGuard<'_> {
        let inner = self.is_engaged().then(|| self.mutex.lock());
        LockGuard { inner }
    }

    /// Run `f` inside the critical section (if engaged).
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.acquire();
        f()
    }
}
