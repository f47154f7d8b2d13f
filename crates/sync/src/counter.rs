// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A counter with no ownership semantics: threads wait for the count to
//! reach zero (spec §4.4.1, §8 scenario 3).

use std::fmt;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use crate::error::SyncError;
use crate::registry::{self, OwnerQuery, PrimitiveId, Tid};
use crate::wait::wait_on;

struct Inner {
    count: i64,
    deleted: bool,
    waiters: u32,
}

/// A counter threads can `inc`/`dec` and block on until it reaches zero.
/// Unlike the other primitives, a counter has no holder TID — any thread may
/// `dec` it, so it never participates in the deadlock detector's wait-for
/// graph as an owned resource (a waiter is never "blocked on a thread").
pub struct Counter {
    id: PrimitiveId,
    state: StdMutex<Inner>,
    cv: Condvar,
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("counter poisoned");
        f.debug_struct("Counter")
            .field("id", &self.id)
            .field("count", &guard.count)
            .finish()
    }
}

impl Counter {
    #[must_use]
    pub fn new(initial: i64) -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            state: StdMutex::new(Inner {
                count: initial,
                deleted: false,
                waiters: 0,
            }),
            cv: Condvar::new(),
        });
        registry::register_primitive(id, Arc::clone(&this) as Arc<dyn OwnerQuery>);
        this
    }

    #[must_use]
    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.state.lock().expect("counter poisoned").count
    }

    pub fn inc(&self) -> Result<i64, SyncError> {
        let mut guard = self.state.lock().expect("counter poisoned");
        if guard.deleted {
            return Err(SyncError::new(vellum_exceptions::ErrorKind::CounterError, "operation on a deleted counter"));
        }
        guard.count += 1;
        Ok(guard.count)
    }

    /// Decrements the count. Fails with `COUNTER-ERROR` if this would take it
    /// below zero. Wakes waiters once the count reaches zero.
    pub fn dec(&self) -> Result<i64, SyncError> {
        let mut guard = self.state.lock().expect("counter poisoned");
        if guard.deleted {
            return Err(SyncError::new(vellum_exceptions::ErrorKind::CounterError, "operation on a deleted counter"));
        }
        if guard.count == 0 {
            return Err(SyncError::new(vellum_exceptions::ErrorKind::CounterError, "dec below zero"));
        }
        guard.count -= 1;
        let count = guard.count;
        if count == 0 {
            self.cv.notify_all();
        }
        Ok(count)
    }

    /// Blocks until the count reaches zero (immediately if it already has).
    /// Returns `true` if the wait timed out before that happened.
    pub fn wait_for_zero(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        let mut guard = self.state.lock().expect("counter poisoned");
        loop {
            if guard.deleted {
                return Err(SyncError::new(vellum_exceptions::ErrorKind::CounterError, "operation on a deleted counter"));
            }
            if guard.count == 0 {
                return Ok(false);
            }
            guard.waiters += 1;
            let (next_guard, timed_out) = wait_on(&self.cv, guard, timeout);
            guard = next_guard;
            guard.waiters -= 1;
            if timed_out {
                return Ok(true);
            }
        }
    }

    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("counter poisoned");
        guard.deleted = true;
        drop(guard);
        self.cv.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl OwnerQuery for Counter {
    fn current_owners(&self) -> Vec<Tid> {
        // A counter has no holder; it never appears as an "owned by" hop in
        // the deadlock detector's chain.
        Vec::new()
    }

    fn kind_name(&self) -> &'static str {
        "Counter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_exceptions::ErrorKind;

    /// Spec §8 scenario 3: counter at 2, two `dec`s, one `waitForZero` with a
    /// 1s timeout unblocks with the reported count at 0.
    #[test]
    fn test_counter_wait_for_zero() {
        let counter = Counter::new(2);
        counter.dec().unwrap();
        counter.dec().unwrap();
        let timed_out = counter.wait_for_zero(Some(Duration::from_secs(1))).unwrap();
        assert!(!timed_out);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_dec_below_zero_is_counter_error() {
        let counter = Counter::new(0);
        let err = counter.dec().unwrap_err();
        assert_eq!(err.kind, ErrorKind::CounterError);
    }

    #[test]
    fn test_operation_on_deleted_counter_fails() {
        let counter = Counter::new(1);
        counter.destroy();
        let err = counter.dec().unwrap_err();
        assert_eq!(err.kind, ErrorKind::CounterError);
    }
}
