// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Class-instance object values.
//!
//! An object's destructor is arbitrary user code, which lives in the
//! evaluator crate layered above this one. To avoid a dependency cycle, a
//! destructor is injected as a type-erased callback at construction time
//! rather than this crate knowing anything about the AST.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use indexmap::IndexMap;

use vellum_exceptions::Sink;

use crate::envelope::{HeapDestroy, StrongRef, WeakRef};
use crate::Value;

/// A user-defined destructor: runs with a read-only view of the object being
/// torn down and the thread's sink, in which it may raise an exception.
pub type DestructorFn = dyn Fn(&QObject, &mut Sink<Value>) + Send + Sync;

/// A heap object value: a class name plus its member storage.
pub struct QObject {
    class_name: String,
    members: RwLock<IndexMap<String, Value>>,
    destructor: Option<Arc<DestructorFn>>,
}

impl QObject {
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            members: RwLock::new(IndexMap::new()),
            destructor: None,
        }
    }

    #[must_use]
    pub fn with_destructor(mut self, destructor: Arc<DestructorFn>) -> Self {
        self.destructor = Some(destructor);
        self
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Takes a weak reference that also remembers the class name, so
    /// `OBJECT-ALREADY-DELETED` can still name the class after the envelope's
    /// contents are gone (the envelope itself carries no class name once
    /// `on_destroy` has taken `contents`).
    #[must_use]
    pub fn downgrade_named(strong: &StrongRef<QObject>) -> WeakObjectRef {
        WeakObjectRef {
            weak: strong.downgrade(),
            class_name: strong.with(|o| o.class_name.clone()),
        }
    }

    #[must_use]
    pub fn get_member(&self, name: &str) -> Option<Value> {
        self.members
            .read()
            .expect("object member lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn set_member(&self, name: impl Into<String>, value: Value) {
        self.members
            .write()
            .expect("object member lock poisoned")
            .insert(name.into(), value);
    }

    /// Installs `value` at `name`, returning whatever was there before in the
    /// same critical section; the lvalue engine uses this to swap a member's
    /// value without a separate get-then-set round trip.
    pub fn replace_member(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.members
            .write()
            .expect("object member lock poisoned")
            .insert(name.into(), value)
    }

    pub fn remove_member(&self, name: &str) -> Option<Value> {
        self.members
            .write()
            .expect("object member lock poisoned")
            .shift_remove(name)
    }

    #[must_use]
    pub fn member_names(&self) -> Vec<String> {
        self.members
            .read()
            .expect("object member lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Takes and holds the member map's write lock for the duration of the
    /// returned guard, so the lvalue engine can resolve a member lvalue and
    /// assign/remove/ensure-unique it under one acquisition instead of a
    /// separate lock per call.
    pub fn lock_members(&self) -> MemberSlot<'_> {
        MemberSlot {
            guard: self.members.write().expect("object member lock poisoned"),
        }
    }
}

/// A weak handle to an object that keeps the class name around after the
/// object is deleted, so `OBJECT-ALREADY-DELETED` can still report which
/// class the dangling reference pointed at (spec §8 scenario 4).
#[derive(Clone)]
pub struct WeakObjectRef {
    weak: WeakRef<QObject>,
    class_name: String,
}

impl WeakObjectRef {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.weak.is_deleted()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.weak.ptr_eq(&other.weak)
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<StrongRef<QObject>> {
        self.weak.upgrade()
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("class_name", &self.class_name)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// An RAII write lock over a single [`QObject`]'s member map, obtained via
/// [`QObject::lock_members`].
pub struct MemberSlot<'a> {
    guard: RwLockWriteGuard<'a, IndexMap<String, Value>>,
}

impl MemberSlot<'_> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.guard.get(name)
    }

    /// Returns a mutable reference to `name`'s slot, inserting `Nothing`
    /// first if the member doesn't exist yet.
    pub fn slot_mut(&mut self, name: &str) -> &mut Value {
        self.guard.entry(name.to_string()).or_insert(Value::Nothing)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.guard.shift_remove(name)
    }
}

impl fmt::Debug for QObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QObject")
            .field("class_name", &self.class_name)
            .field("member_count", &self.members.read().map(|m| m.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl HeapDestroy for QObject {
    fn on_destroy(self, sink: &mut Sink<Value>) {
        if let Some(destructor) = self.destructor.clone() {
            destructor(&self, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_member() {
        let obj = QObject::new("Widget");
        obj.set_member("count", Value::Int(3));
        assert!(matches!(obj.get_member("count"), Some(Value::Int(3))));
    }

    #[test]
    fn test_lock_members_slot_mut_inserts_nothing_first() {
        let obj = QObject::new("Widget");
        {
            let mut slot = obj.lock_members();
            assert!(matches!(slot.slot_mut("count"), Value::Nothing));
            *slot.slot_mut("count") = Value::Int(5);
        }
        assert!(matches!(obj.get_member("count"), Some(Value::Int(5))));
    }

    #[test]
    fn test_destructor_runs_with_member_access() {
        let destructor: Arc<DestructorFn> = Arc::new(|obj, sink| {
            if obj.get_member("locked").is_none() {
                sink.raise_system(vellum_exceptions::ErrorKind::ObjectAlreadyDeleted, "no lock held");
            }
        });
        let obj = QObject::new("Resource").with_destructor(destructor);
        let mut sink: Sink<Value> = Sink::new();
        obj.on_destroy(&mut sink);
        assert!(sink.is_exception());
    }
}
