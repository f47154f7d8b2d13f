// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The cross-primitive deadlock detector (spec §4.4.2).
//!
//! Evaluated at acquire time, before a thread goes to sleep: follow the
//! wait-for chain starting at the primitive the thread is about to block on.
//! If the chain leads back to the calling thread, it's a cycle — raise
//! `THREAD-DEADLOCK` instead of sleeping.

use std::collections::HashSet;
use std::sync::{Mutex as StdMutex, OnceLock};

use crate::registry::{owners_and_kind, vlock_for, PrimitiveId, Tid};

/// Describes a detected cycle: for each hop, the thread that owns a
/// primitive and which primitive that is.
#[derive(Debug, Clone)]
pub struct DeadlockInfo {
    pub this_tid: Tid,
    pub chain: Vec<(Tid, PrimitiveId, &'static str)>,
}

impl DeadlockInfo {
    /// Renders the locks, TIDs, and primitive kinds involved, per spec §4.4.2
    /// ("the locks involved, the TIDs, and the primitive kinds are included
    /// in the exception description").
    #[must_use]
    pub fn describe(&self) -> String {
        let hops: Vec<String> = self
            .chain
            .iter()
            .map(|(tid, pid, kind)| format!("thread {tid} holds {kind}#{pid}"))
            .collect();
        format!(
            "deadlock detected: thread {} would block waiting on a chain that loops back to itself ({})",
            self.this_tid,
            hops.join(", ")
        )
    }
}

/// Walks the wait-for chain starting at `target`'s current owners. If the
/// chain reaches `this_tid`, returns the cycle; the traversal is bounded by
/// `visited` so it always terminates even on malformed registry state.
#[must_use]
pub fn detect_deadlock(this_tid: Tid, target: PrimitiveId) -> Option<DeadlockInfo> {
    let mut visited: HashSet<Tid> = HashSet::new();
    let mut chain = Vec::new();
    let mut frontier: Vec<PrimitiveId> = vec![target];

    while let Some(pid) = frontier.pop() {
        let Some((owners, kind)) = owners_and_kind(pid) else {
            continue;
        };
        for owner in owners {
            if owner == this_tid {
                chain.push((owner, pid, kind));
                return Some(DeadlockInfo { this_tid, chain });
            }
            if !visited.insert(owner) {
                continue;
            }
            chain.push((owner, pid, kind));
            if let Some(vlock) = vlock_for(owner) {
                if let Some(next) = vlock.waiting_on() {
                    frontier.push(next);
                }
            }
        }
    }
    None
}

/// Serializes the "check, then commit to waiting" step across every
/// primitive in the process.
///
/// `detect_deadlock` and `VLock::set_waiting` are each individually atomic,
/// but the two calls together are not: without a lock spanning both, two
/// threads racing to block on each other (T1 about to wait on T2's primitive,
/// T2 about to wait on T1's) can each run `detect_deadlock` before the other
/// has recorded what it's waiting on, so neither sees the cycle and both go
/// to sleep. A single process-wide mutex around the combined step closes that
/// window; it is held only for the check itself, never across the actual
/// condvar wait.
fn detector_lock() -> &'static StdMutex<()> {
    static LOCK: OnceLock<StdMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| StdMutex::new(()))
}

/// Atomically checks whether `this_tid` blocking on `target` would complete a
/// cycle and, if not, records `target` as what `this_tid` is now waiting on.
/// Callers must clear the wait (`set_waiting(None)`) once they wake.
pub fn check_and_register_wait(this_tid: Tid, target: PrimitiveId) -> Result<(), DeadlockInfo> {
    let _guard = detector_lock().lock().expect("deadlock detector lock poisoned");
    if let Some(info) = detect_deadlock(this_tid, target) {
        return Err(info);
    }
    if let Some(vlock) = vlock_for(this_tid) {
        vlock.set_waiting(Some(target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::{next_primitive_id, register_primitive, register_thread, unregister_primitive, unregister_thread, OwnerQuery};

    #[derive(Debug)]
    struct FixedOwner(Vec<Tid>);
    impl OwnerQuery for FixedOwner {
        fn current_owners(&self) -> Vec<Tid> {
            self.0.clone()
        }
        fn kind_name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[test]
    fn test_two_thread_cycle_is_detected() {
        // T1 holds P1, waits on P2. T2 holds P2, waits on P1.
        let t1 = register_thread(101);
        let t2 = register_thread(102);

        let p1 = next_primitive_id();
        register_primitive(p1, Arc::new(FixedOwner(vec![101])));
        let p2 = next_primitive_id();
        register_primitive(p2, Arc::new(FixedOwner(vec![102])));

        t1.set_waiting(Some(p2));
        t2.set_waiting(Some(p1));

        // T1 is about to block on P2, forming the cycle back to itself.
        let info = detect_deadlock(101, p2);
        assert!(info.is_some());

        unregister_primitive(p1);
        unregister_primitive(p2);
        unregister_thread(101);
        unregister_thread(102);
    }

    #[test]
    fn test_no_cycle_when_chain_terminates() {
        let t2 = register_thread(201);
        let p1 = next_primitive_id();
        register_primitive(p1, Arc::new(FixedOwner(vec![201])));
        // T2 holds P1 but is not waiting on anything.
        t2.set_waiting(None);

        assert!(detect_deadlock(200, p1).is_none());

        unregister_primitive(p1);
        unregister_thread(201);
    }
}
