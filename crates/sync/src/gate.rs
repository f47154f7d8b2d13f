// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A gate: held by a "party" (an admission token shared by a set of
//! threads), re-entrant by party id rather than by TID (spec §4.4.1).
//!
//! Any thread presenting the current party's id may enter without blocking,
//! even if it has never entered before; this is what distinguishes a `Gate`
//! from an [`crate::rmutex::RMutex`], which is re-entrant per-TID.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use vellum_exceptions::ErrorKind;

use crate::deadlock::check_and_register_wait;
use crate::error::SyncError;
use crate::registry::{self, OwnerQuery, PrimitiveId, Tid};
use crate::state::{new_fsm, PrimitiveState, PrimitiveTrigger};
use crate::wait::wait_on;

/// Identifies the party currently admitted through a [`Gate`].
pub type PartyId = u64;

struct Inner {
    fsm: vellum_core::fsm::FiniteStateMachine<PrimitiveState, PrimitiveTrigger>,
    party: Option<PartyId>,
    holder_tid: Option<Tid>,
    count: u32,
}

/// A gate admitting a single party at a time, re-entrant for any thread
/// presenting that party's id.
pub struct Gate {
    id: PrimitiveId,
    state: StdMutex<Inner>,
    cv: Condvar,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("gate poisoned");
        f.debug_struct("Gate")
            .field("id", &self.id)
            .field("party", &guard.party)
            .field("count", &guard.count)
            .finish()
    }
}

impl Gate {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            state: StdMutex::new(Inner {
                fsm: new_fsm(),
                party: None,
                holder_tid: None,
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

    #[must_use]
    pub fn inside_count(&self) -> u32 {
        self.state.lock().expect("gate poisoned").count
    }

    /// Enters the gate as `tid`, a member of `party`. Succeeds immediately if
    /// the gate is unlocked or already admits `party`; blocks otherwise.
    pub fn enter(&self, tid: Tid, party: PartyId, timeout: Option<Duration>) -> Result<u32, SyncError> {
        let mut guard = self.state.lock().expect("gate poisoned");
        loop {
            match guard.fsm.state() {
                PrimitiveState::Deleted => return Err(SyncError::lock_error("operation on a deleted gate")),
                PrimitiveState::Unlocked => {
                    guard.fsm.trigger(PrimitiveTrigger::Acquire);
                    guard.party = Some(party);
                    guard.holder_tid = Some(tid);
                    guard.count = 1;
                    let count = guard.count;
                    drop(guard);
                    if let Some(vlock) = registry::vlock_for(tid) {
                        vlock.push_held(self.id);
                    }
                    return Ok(count);
                }
                PrimitiveState::Held if guard.party == Some(party) => {
                    guard.count += 1;
                    guard.holder_tid = Some(tid);
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

    /// Exits one level; at count zero, releases the party and wakes waiters.
    pub fn exit(&self, tid: Tid, party: PartyId) -> Result<u32, SyncError> {
        let mut guard = self.state.lock().expect("gate poisoned");
        if guard.fsm.state() == PrimitiveState::Deleted {
            return Err(SyncError::lock_error("operation on a deleted gate"));
        }
        if guard.party != Some(party) {
            return Err(SyncError::lock_error("release by a party that does not hold the gate"));
        }
        guard.count -= 1;
        let count = guard.count;
        if count == 0 {
            guard.fsm.trigger(PrimitiveTrigger::Release);
            guard.party = None;
            let holder = guard.holder_tid.take();
            drop(guard);
            if let Some(holder_tid) = holder {
                if let Some(vlock) = registry::vlock_for(holder_tid) {
                    vlock.remove_held(self.id);
                }
            }
            let _ = tid;
            self.cv.notify_all();
        }
        Ok(count)
    }

    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("gate poisoned");
        if guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Delete);
        }
        guard.party = None;
        guard.count = 0;
        drop(guard);
        self.cv.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl OwnerQuery for Gate {
    fn current_owners(&self) -> Vec<Tid> {
        self.state.lock().expect("gate poisoned").holder_tid.into_iter().collect()
    }

    fn kind_name(&self) -> &'static str {
        "Gate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_thread, unregister_thread};

    #[test]
    fn test_any_thread_in_party_enters_without_blocking() {
        let t1 = 7001;
        let t2 = 7002;
        let _v1 = register_thread(t1);
        let _v2 = register_thread(t2);
        let gate = Gate::new();
        assert_eq!(gate.enter(t1, 1, None).unwrap(), 1);
        assert_eq!(gate.enter(t2, 1, None).unwrap(), 2);
        assert_eq!(gate.exit(t2, 1).unwrap(), 1);
        assert_eq!(gate.exit(t1, 1).unwrap(), 0);
        unregister_thread(t1);
        unregister_thread(t2);
    }

    #[test]
    fn test_different_party_is_rejected_on_release() {
        let t1 = 7003;
        let _v1 = register_thread(t1);
        let gate = Gate::new();
        gate.enter(t1, 1, None).unwrap();
        let err = gate.exit(t1, 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockError);
        unregister_thread(t1);
    }
}
