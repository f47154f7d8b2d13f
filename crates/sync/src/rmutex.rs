// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A recursive mutex: held by one TID, re-entrant with an acquisition count
//! (spec §4.4.1, §8 scenario 2).

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
    count: u32,
}

/// A recursive mutex. The owning thread may call [`RMutex::enter`] multiple
/// times; it must call [`RMutex::exit`] the same number of times before
/// another thread can acquire it.
pub struct RMutex {
    id: PrimitiveId,
    state: StdMutex<Inner>,
    cv: Condvar,
}

impl fmt::Debug for RMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("rmutex poisoned");
        f.debug_struct("RMutex")
            .field("id", &self.id)
            .field("owner", &guard.owner)
            .field("count", &guard.count)
            .finish()
    }
}

impl RMutex {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            state: StdMutex::new(Inner {
                fsm: new_fsm(),
                owner: None,
                count: 0,
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

    /// The current acquisition count (0 when unlocked).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.state.lock().expect("rmutex poisoned").count
    }

    /// Enters the lock, incrementing the count if `tid` already holds it.
    pub fn enter(&self, tid: Tid, timeout: Option<Duration>) -> Result<u32, SyncError> {
        let mut guard = self.state.lock().expect("rmutex poisoned");
        loop {
            match guard.fsm.state() {
                PrimitiveState::Deleted => {
                    return Err(SyncError::lock_error("operation on a deleted rmutex"))
                }
                PrimitiveState::Unlocked => {
                    guard.fsm.trigger(PrimitiveTrigger::Acquire);
                    guard.owner = Some(tid);
                    guard.count = 1;
                    let count = guard.count;
                    drop(guard);
                    if let Some(vlock) = registry::vlock_for(tid) {
                        vlock.push_held(self.id);
                    }
                    return Ok(count);
                }
                PrimitiveState::Held if guard.owner == Some(tid) => {
                    guard.count += 1;
                    return Ok(guard.count);
                }
                PrimitiveState::Held => {
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
                }
            }
        }
    }

    /// Exits one level of recursion; at count zero, unlocks and wakes one
    /// waiter.
    pub fn exit(&self, tid: Tid) -> Result<u32, SyncError> {
        let mut guard = self.state.lock().expect("rmutex poisoned");
        if guard.fsm.state() == PrimitiveState::Deleted {
            return Err(SyncError::lock_error("operation on a deleted rmutex"));
        }
        if guard.owner != Some(tid) {
            return Err(SyncError::lock_error("release by a thread that does not hold the rmutex"));
        }
        guard.count -= 1;
        let count = guard.count;
        if count == 0 {
            guard.fsm.trigger(PrimitiveTrigger::Release);
            guard.owner = None;
            drop(guard);
            if let Some(vlock) = registry::vlock_for(tid) {
                vlock.remove_held(self.id);
            }
            self.cv.notify_one();
        }
        Ok(count)
    }

    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("rmutex poisoned");
        if guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Delete);
        }
        guard.owner = None;
        guard.count = 0;
        drop(guard);
        self.cv.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl Drop for RMutex {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl OwnerQuery for RMutex {
    fn current_owners(&self) -> Vec<Tid> {
        self.state.lock().expect("rmutex poisoned").owner.into_iter().collect()
    }

    fn kind_name(&self) -> &'static str {
        "RMutex"
    }
}

impl Waitable for RMutex {
    fn release_for_wait(&self, tid: Tid) -> Result<(), SyncError> {
        self.exit(tid).map(|_| ())
    }

    fn reacquire_after_wait(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.enter(tid, timeout).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_thread, unregister_thread};

    /// Spec §8 scenario 2: `enter()` three times then `exit()` three times
    /// yields the count sequence `1,2,3,2,1,0` and a final `unlocked` state.
    #[test]
    fn test_recursive_enter_exit_sequence() {
        let tid = 6001;
        let _vlock = register_thread(tid);
        let m = RMutex::new();
        assert_eq!(m.enter(tid, None).unwrap(), 1);
        assert_eq!(m.enter(tid, None).unwrap(), 2);
        assert_eq!(m.enter(tid, None).unwrap(), 3);
        assert_eq!(m.exit(tid).unwrap(), 2);
        assert_eq!(m.exit(tid).unwrap(), 1);
        assert_eq!(m.exit(tid).unwrap(), 0);
        assert!(m.current_owners().is_empty());
        unregister_thread(tid);
    }

    #[test]
    fn test_exit_below_zero_is_lock_error() {
        let tid = 6002;
        let _vlock = register_thread(tid);
        let m = RMutex::new();
        let err = m.exit(tid).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(tid);
    }
}
