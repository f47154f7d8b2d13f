// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A non-reentrant mutex held by at most one thread at a time (spec §4.4.1).

use std::fmt;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use vellum_exceptions::ErrorKind;

use crate::deadlock::check_and_register_wait;
use crate::error::SyncError;
use crate::registry::{self, OwnerQuery, PrimitiveId, Tid};
use crate::state::{new_fsm, PrimitiveState, PrimitiveTrigger};
use crate::wait::wait_on;
use crate::Waitable;

struct Inner {
    fsm: vellum_core::fsm::FiniteStateMachine<PrimitiveState, PrimitiveTrigger>,
    owner: Option<Tid>,
}

/// A non-reentrant, exclusive lock: at most one TID may hold it, and that
/// same TID may not acquire it again without first releasing it.
pub struct Mutex {
    id: PrimitiveId,
    state: StdMutex<Inner>,
    cv: Condvar,
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("mutex poisoned");
        f.debug_struct("Mutex")
            .field("id", &self.id)
            .field("state", &guard.fsm.state())
            .field("owner", &guard.owner)
            .finish()
    }
}

impl Mutex {
    /// Creates and registers a new, unlocked mutex.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            state: StdMutex::new(Inner {
                fsm: new_fsm(),
                owner: None,
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

    /// Acquires the mutex for `tid`, blocking (optionally with `timeout`) if
    /// another thread holds it. Runs the deadlock check before sleeping.
    pub fn acquire(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("mutex poisoned");
        loop {
            match guard.fsm.state() {
                PrimitiveState::Deleted => {
                    return Err(SyncError::lock_error("operation on a deleted mutex"))
                }
                PrimitiveState::Unlocked => {
                    guard.fsm.trigger(PrimitiveTrigger::Acquire);
                    guard.owner = Some(tid);
                    drop(guard);
                    if let Some(vlock) = registry::vlock_for(tid) {
                        vlock.push_held(self.id);
                    }
                    return Ok(());
                }
                PrimitiveState::Held => {
                    if guard.owner == Some(tid) {
                        return Err(SyncError::lock_error(
                            "mutex is not re-entrant: already held by this thread",
                        ));
                    }
                    if let Err(info) = check_and_register_wait(tid, self.id) {
                        return Err(SyncError::new(ErrorKind::ThreadDeadlock, info.describe()));
                    }
                    let (next_guard, timed_out) = wait_on(&self.cv, guard, timeout);
                    guard = next_guard;
                    if let Some(vlock) = registry::vlock_for(tid) {
                        vlock.set_waiting(None);
                    }
                    if timed_out {
                        return Err(SyncError::lock_error("acquire timed out"));
                    }
                    // Re-check state at the top of the loop (spurious wakeup or
                    // lost the race to another waiter).
                }
            }
        }
    }

    /// Releases the mutex. Fails if `tid` does not currently hold it.
    pub fn release(&self, tid: Tid) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("mutex poisoned");
        if guard.fsm.state() == PrimitiveState::Deleted {
            return Err(SyncError::lock_error("operation on a deleted mutex"));
        }
        if guard.owner != Some(tid) {
            return Err(SyncError::lock_error("release by a thread that does not hold the mutex"));
        }
        guard.fsm.trigger(PrimitiveTrigger::Release);
        guard.owner = None;
        drop(guard);
        if let Some(vlock) = registry::vlock_for(tid) {
            vlock.remove_held(self.id);
        }
        self.cv.notify_one();
        Ok(())
    }

    /// Destroys the mutex: any blocked waiters wake and fail with `LOCK-ERROR`.
    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("mutex poisoned");
        if guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Delete);
        }
        guard.owner = None;
        drop(guard);
        self.cv.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl OwnerQuery for Mutex {
    fn current_owners(&self) -> Vec<Tid> {
        self.state
            .lock()
            .expect("mutex poisoned")
            .owner
            .into_iter()
            .collect()
    }

    fn kind_name(&self) -> &'static str {
        "Mutex"
    }
}

impl Waitable for Mutex {
    fn release_for_wait(&self, tid: Tid) -> Result<(), SyncError> {
        self.release(tid)
    }

    fn reacquire_after_wait(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.acquire(tid, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_thread, unregister_thread};

    #[test]
    fn test_acquire_then_release_cycle() {
        let tid = 5001;
        let _vlock = register_thread(tid);
        let m = Mutex::new();
        m.acquire(tid, None).unwrap();
        assert_eq!(m.current_owners(), vec![tid]);
        m.release(tid).unwrap();
        assert!(m.current_owners().is_empty());
        unregister_thread(tid);
    }

    #[test]
    fn test_release_without_hold_is_lock_error() {
        let tid = 5002;
        let _vlock = register_thread(tid);
        let m = Mutex::new();
        let err = m.release(tid).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(tid);
    }

    #[test]
    fn test_release_by_wrong_tid_is_lock_error() {
        let owner = 5003;
        let other = 5004;
        let _v1 = register_thread(owner);
        let _v2 = register_thread(other);
        let m = Mutex::new();
        m.acquire(owner, None).unwrap();
        let err = m.release(other).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(owner);
        unregister_thread(other);
    }

    #[test]
    fn test_operation_on_deleted_mutex_fails() {
        let tid = 5005;
        let _vlock = register_thread(tid);
        let m = Mutex::new();
        m.destroy();
        let err = m.acquire(tid, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(tid);
    }

    #[test]
    fn test_reentrant_acquire_on_mutex_is_rejected() {
        let tid = 5006;
        let _vlock = register_thread(tid);
        let m = Mutex::new();
        m.acquire(tid, None).unwrap();
        let err = m.acquire(tid, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(tid);
    }
}
