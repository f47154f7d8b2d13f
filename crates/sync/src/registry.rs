// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The process-wide TID registry and lock-primitive registry the deadlock
//! detector walks.
//!
//! Both are `OnceLock`-initialized singletons guarded by a `std::sync::RwLock`,
//! read-locked by the deadlock detector and write-locked only on thread/
//! primitive creation and teardown — the same singleton shape the teacher
//! uses for its process-wide Tokio runtime handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, RwLock};

use vellum_core::consts::TID_NOBODY;

/// A thread identifier. `vellum-threads` allocates these; `vellum-sync` only
/// ever treats them as opaque keys.
pub type Tid = i64;

/// An opaque, process-wide unique handle to a registered lock primitive.
pub type PrimitiveId = u64;

/// The sentinel meaning "no thread", re-exported for convenience.
pub const NOBODY: Tid = TID_NOBODY;

/// Implemented by every lock primitive so the deadlock detector can ask "who
/// currently holds you" without knowing the primitive's concrete type.
pub trait OwnerQuery: Send + Sync + fmt::Debug {
    /// The TIDs currently holding this primitive (zero, one, or — for a
    /// `RwLock` held by readers — many).
    fn current_owners(&self) -> Vec<Tid>;

    /// A short name for this primitive's kind, used in deadlock descriptions.
    fn kind_name(&self) -> &'static str;
}

/// Per-thread deadlock-detector state: the thread's ordered lock stack (the
/// "vlock" of spec §4.4) and, while blocked, the single primitive it is
/// currently waiting on.
#[derive(Debug)]
pub struct VLock {
    tid: Tid,
    held: StdMutex<Vec<PrimitiveId>>,
    waiting_on: StdMutex<Option<PrimitiveId>>,
}

impl VLock {
    fn new(tid: Tid) -> Self {
        Self {
            tid,
            held: StdMutex::new(Vec::new()),
            waiting_on: StdMutex::new(None),
        }
    }

    #[must_use]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Pushes `id` onto the held stack; acquisition order is preserved.
    pub fn push_held(&self, id: PrimitiveId) {
        self.held.lock().expect("vlock poisoned").push(id);
    }

    /// Removes `id` from the held stack.
    ///
    /// Returns `true` if `id` was the most recently acquired (LIFO-top)
    /// entry. Callers that require in-order release (every primitive except
    /// a `RwLock` reader hold, per spec §9's open-question resolution) treat
    /// a `false` return as an out-of-order release.
    pub fn remove_held(&self, id: PrimitiveId) -> bool {
        let mut held = self.held.lock().expect("vlock poisoned");
        let is_top = held.last() == Some(&id);
        if let Some(pos) = held.iter().rposition(|&x| x == id) {
            held.remove(pos);
        }
        is_top
    }

    #[must_use]
    pub fn held_snapshot(&self) -> Vec<PrimitiveId> {
        self.held.lock().expect("vlock poisoned").clone()
    }

    pub fn set_waiting(&self, id: Option<PrimitiveId>) {
        *self.waiting_on.lock().expect("vlock poisoned") = id;
    }

    #[must_use]
    pub fn waiting_on(&self) -> Option<PrimitiveId> {
        *self.waiting_on.lock().expect("vlock poisoned")
    }
}

struct Registries {
    primitives: RwLock<HashMap<PrimitiveId, Arc<dyn OwnerQuery>>>,
    threads: RwLock<HashMap<Tid, Arc<VLock>>>,
}

fn registries() -> &'static Registries {
    static REG: OnceLock<Registries> = OnceLock::new();
    REG.get_or_init(|| Registries {
        primitives: RwLock::new(HashMap::new()),
        threads: RwLock::new(HashMap::new()),
    })
}

static NEXT_PRIMITIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next process-wide unique primitive id.
#[must_use]
pub fn next_primitive_id() -> PrimitiveId {
    NEXT_PRIMITIVE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Registers a newly constructed primitive so the deadlock detector can query
/// its current owners.
pub fn register_primitive(id: PrimitiveId, query: Arc<dyn OwnerQuery>) {
    registries()
        .primitives
        .write()
        .expect("primitive registry poisoned")
        .insert(id, query);
}

/// Unregisters a primitive on destruction.
pub fn unregister_primitive(id: PrimitiveId) {
    registries()
        .primitives
        .write()
        .expect("primitive registry poisoned")
        .remove(&id);
}

pub(crate) fn owners_and_kind(id: PrimitiveId) -> Option<(Vec<Tid>, &'static str)> {
    registries()
        .primitives
        .read()
        .expect("primitive registry poisoned")
        .get(&id)
        .map(|q| (q.current_owners(), q.kind_name()))
}

/// Registers `tid`'s deadlock-detector state. `vellum-threads::ThreadContext`
/// calls this on attach and holds the returned handle for the thread's
/// lifetime, unregistering it (via [`unregister_thread`]) on detach.
#[must_use]
pub fn register_thread(tid: Tid) -> Arc<VLock> {
    let vlock = Arc::new(VLock::new(tid));
    registries()
        .threads
        .write()
        .expect("thread registry poisoned")
        .insert(tid, Arc::clone(&vlock));
    vlock
}

/// Unregisters `tid`'s deadlock-detector state on thread exit.
pub fn unregister_thread(tid: Tid) {
    registries()
        .threads
        .write()
        .expect("thread registry poisoned")
        .remove(&tid);
}

/// Looks up `tid`'s [`VLock`], if it is currently registered.
#[must_use]
pub fn vlock_for(tid: Tid) -> Option<Arc<VLock>> {
    registries()
        .threads
        .read()
        .expect("thread registry poisoned")
        .get(&tid)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Probe(Vec<Tid>);
    impl OwnerQuery for Probe {
        fn current_owners(&self) -> Vec<Tid> {
            self.0.clone()
        }
        fn kind_name(&self) -> &'static str {
            "Probe"
        }
    }

    #[test]
    fn test_vlock_remove_detects_out_of_order() {
        let vlock = register_thread(9001);
        vlock.push_held(1);
        vlock.push_held(2);
        assert!(!vlock.remove_held(1));
        assert!(vlock.remove_held(2));
        unregister_thread(9001);
    }

    #[test]
    fn test_primitive_registry_roundtrip() {
        let id = next_primitive_id();
        register_primitive(id, Arc::new(Probe(vec![7])));
        assert_eq!(owners_and_kind(id).unwrap().0, vec![7]);
        unregister_primitive(id);
        assert!(owners_and_kind(id).is_none());
    }
}
