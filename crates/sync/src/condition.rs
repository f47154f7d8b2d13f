// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Condition variables that wait against another primitive (spec §4.4.3).
//!
//! `wait` releases the passed primitive, blocks, and re-acquires it in the
//! original mode on wake. The primitive to wait against is any
//! [`crate::Waitable`] — [`crate::mutex::Mutex`], [`crate::rmutex::RMutex`],
//! or an [`crate::rwlock::RwLockReadHandle`]/[`crate::rwlock::RwLockWriteHandle`]
//! wrapper that pins down which side of the `RwLock` is held.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use crate::error::SyncError;
use crate::registry::{self, PrimitiveId, Tid};
use crate::wait::wait_on;
use crate::Waitable;

/// A condition variable. Tracks how many waiters are currently blocked so a
/// primitive being destroyed while a condition waits on it can correctly
/// wake and fail every one of them.
pub struct Condition {
    id: PrimitiveId,
    gate: StdMutex<()>,
    cv: Condvar,
    waiters: AtomicUsize,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .finish()
    }
}

impl Condition {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self {
            id: registry::next_primitive_id(),
            gate: StdMutex::new(()),
            cv: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
        .into()
    }

    #[must_use]
    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Atomically (from the language's perspective) releases `lock`, blocks
    /// until signaled or `timeout` expires, then re-acquires `lock` in its
    /// original mode. Returns `true` if the wait timed out.
    pub fn wait(&self, lock: &dyn Waitable, tid: Tid, timeout: Option<Duration>) -> Result<bool, SyncError> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        // Hold `gate` across the primitive's release so a concurrent
        // `signal`/`broadcast` (which also takes `gate` below) can't fire in
        // the window between "primitive released" and "parked on `cv`" —
        // `wait_on` only gives up `gate` as part of atomically parking.
        let guard = self.gate.lock().expect("condition poisoned");
        if let Err(err) = lock.release_for_wait(tid) {
            drop(guard);
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            return Err(err);
        }

        let (_, timed_out) = wait_on(&self.cv, guard, timeout);
        self.waiters.fetch_sub(1, Ordering::SeqCst);

        lock.reacquire_after_wait(tid, None)?;
        Ok(timed_out)
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        let _guard = self.gate.lock().expect("condition poisoned");
        self.cv.notify_one();
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) {
        let _guard = self.gate.lock().expect("condition poisoned");
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::Mutex;
    use crate::registry::{register_thread, unregister_thread, OwnerQuery};
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_wait_releases_and_reacquires_lock() {
        let tid = 9001;
        let _vlock = register_thread(tid);
        let mutex = Mutex::new();
        let condition = Condition::new();

        mutex.acquire(tid, None).unwrap();
        // Signal immediately from another (logical) thread perspective so the
        // wait doesn't block forever in a single-threaded test.
        let cv_clone = Arc::clone(&condition);
        let handle = thread::spawn(move || {
            thread::sleep(StdDuration::from_millis(20));
            cv_clone.signal();
        });
        let timed_out = condition.wait(mutex.as_ref(), tid, Some(StdDuration::from_secs(2))).unwrap();
        assert!(!timed_out);
        // Lock must be held again after wait returns.
        assert_eq!(mutex.current_owners(), vec![tid]);
        handle.join().unwrap();
        mutex.release(tid).unwrap();
        unregister_thread(tid);
    }
}
