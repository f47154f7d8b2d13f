// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Lvalue resolution: `acquire` a storage cell, assign/read/remove it under
//! its declared-type constraint, and release automatically on drop.

use tracing::debug;

use vellum_exceptions::ErrorKind;
use vellum_value::{Sink, Value};

use crate::declared_type::DeclaredType;
use crate::target::LvalueTarget;

/// A locked handle onto a resolved storage cell.
///
/// Each accessor (`get`/`assign`/`ensure_unique`/`remove`) takes its own
/// short-lived lock on the underlying container rather than holding one for
/// the helper's whole lifetime; [`Drop`] is therefore a no-op; it exists so
/// the type documents "this is a transient, scoped handle" the way the
/// contract describes, and so a future container type that does need a
/// held lock can add one without changing callers.
#[derive(Debug)]
pub struct LvalueHelper<'a> {
    target: LvalueTarget<'a>,
    declared_type: DeclaredType,
}

impl<'a> LvalueHelper<'a> {
    fn new(target: LvalueTarget<'a>, declared_type: DeclaredType) -> Self {
        Self {
            target,
            declared_type,
        }
    }

    /// Read-through access to the current value. Never transfers ownership:
    /// the caller gets a `ref()`'d clone.
    #[must_use]
    pub fn get(&self) -> Value {
        match &self.target {
            LvalueTarget::Local(slot) => slot.peek(),
            LvalueTarget::Member { owner, name } => {
                owner.with(|o| o.get_member(name)).unwrap_or(Value::Nothing)
            }
            LvalueTarget::HashKey { owner, key } => {
                owner.with(|h| h.get(key).cloned()).unwrap_or(Value::Nothing)
            }
            LvalueTarget::ListIndex { owner, index } => owner
                .with(|l| l.get(*index).cloned())
                .unwrap_or(Value::Nothing),
        }
    }

    /// Installs `value` in place, type-checking it against the cell's
    /// declared type first. On a type mismatch, raises `RUNTIME-TYPE-ERROR`
    /// and leaves the cell unchanged. The value previously held is released
    /// (via `deref`) after the new value is installed, so a destructor
    /// triggered by the old value's drop never runs while the container's
    /// own lock is held.
    pub fn assign(&self, value: Value, sink: &mut Sink) {
        if !self.declared_type.accepts(&value) {
            sink.raise_system(
                ErrorKind::RuntimeTypeError,
                format!(
                    "cannot assign a {} to a {} cell declared {:?}",
                    value.type_name(),
                    self.target.kind_name(),
                    self.declared_type
                ),
            );
            return;
        }
        let old = self.replace_raw(value);
        old.deref(sink);
    }

    /// If the cell holds a shared (non-unique) container, replaces it with
    /// an independent deep copy so the caller may mutate it safely. A no-op
    /// for scalars and for already-unique containers.
    ///
    /// Checks uniqueness by borrowing the stored value in place rather than
    /// through [`LvalueHelper::get`]: a read-through clone would itself add a
    /// strong handle and make every container appear shared.
    pub fn ensure_unique(&self, sink: &mut Sink) {
        if self.is_unique_in_place() {
            return;
        }
        let current = self.get();
        let fresh = current.real_copy();
        current.deref(sink);
        let old = self.replace_raw(fresh);
        old.deref(sink);
    }

    fn is_unique_in_place(&self) -> bool {
        match &self.target {
            LvalueTarget::Local(slot) => slot.lock().is_unique(),
            LvalueTarget::Member { owner, name } => owner
                .with(|o| o.lock_members().get(name).map(Value::is_unique))
                .unwrap_or(true),
            LvalueTarget::HashKey { owner, key } => {
                owner.with(|h| h.get(key).map(Value::is_unique)).unwrap_or(true)
            }
            LvalueTarget::ListIndex { owner, index } => owner
                .with(|l| l.get(*index).map(Value::is_unique))
                .unwrap_or(true),
        }
    }

    /// Reads the current value out and installs `Nothing`, returning what
    /// was there. Backs `delete`/`remove`/`splice`.
    #[must_use]
    pub fn remove(&self) -> Value {
        self.replace_raw(Value::Nothing)
    }

    fn replace_raw(&self, value: Value) -> Value {
        match &self.target {
            LvalueTarget::Local(slot) => std::mem::replace(&mut *slot.lock(), value),
            LvalueTarget::Member { owner, name } => owner
                .with(|o| o.replace_member(name.clone(), value))
                .unwrap_or(Value::Nothing),
            LvalueTarget::HashKey { owner, key } => owner
                .with_mut(|h| h.insert(key.clone(), value))
                .unwrap_or(Value::Nothing),
            LvalueTarget::ListIndex { owner, index } => {
                owner.with_mut(|l| std::mem::replace(l.slot_mut(*index), value))
            }
        }
    }
}

/// Resolves `target` into a [`LvalueHelper`]. Always succeeds: resolution
/// failures (a dangling weak owner, a class-mismatched member) surface as
/// `Nothing` reads from [`LvalueHelper::get`] rather than as an acquisition
/// error, matching how the rest of the data model treats a deleted
/// container as an empty one rather than a fault.
#[must_use]
pub fn acquire(target: LvalueTarget<'_>, declared_type: DeclaredType) -> LvalueHelper<'_> {
    debug!(kind = target.kind_name(), "lvalue acquired");
    LvalueHelper::new(target, declared_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_value::{LocalSlot, QHash, QList, QObject, StrongRef};

    #[test]
    fn test_local_assign_and_get() {
        let slot = LocalSlot::new(Value::Int(1));
        let helper = acquire(LvalueTarget::Local(slot.clone()), DeclaredType::Any);
        let mut sink = Sink::new();
        helper.assign(Value::Int(2), &mut sink);
        assert!(!sink.is_exception());
        assert!(matches!(helper.get(), Value::Int(2)));
    }

    #[test]
    fn test_typed_local_rejects_mismatched_assignment() {
        let slot = LocalSlot::new(Value::Int(1));
        let helper = acquire(LvalueTarget::Local(slot), DeclaredType::Int);
        let mut sink = Sink::new();
        helper.assign(Value::string("oops"), &mut sink);
        assert!(sink.is_exception());
        assert!(matches!(helper.get(), Value::Int(1)));
    }

    #[test]
    fn test_member_assign_replaces_in_place() {
        let owner = StrongRef::new(QObject::new("Widget"));
        owner.with(|o| o.set_member("count", Value::Int(1)));
        let helper = acquire(
            LvalueTarget::Member {
                owner: &owner,
                name: "count".to_string(),
            },
            DeclaredType::Any,
        );
        let mut sink = Sink::new();
        helper.assign(Value::Int(5), &mut sink);
        assert!(matches!(
            owner.with(|o| o.get_member("count")),
            Some(Value::Int(5))
        ));
    }

    #[test]
    fn test_hash_key_remove_installs_nothing() {
        let owner = StrongRef::new(QHash::new());
        owner.with_mut(|h| h.insert("a", Value::Int(9)));
        let helper = acquire(
            LvalueTarget::HashKey {
                owner: &owner,
                key: "a".to_string(),
            },
            DeclaredType::Any,
        );
        let removed = helper.remove();
        assert!(matches!(removed, Value::Int(9)));
        assert!(matches!(helper.get(), Value::Nothing));
    }

    #[test]
    fn test_list_index_ensure_unique_copies_shared_list() {
        let owner = StrongRef::new(QList::new());
        owner.with_mut(|l| l.push(Value::list(vec![Value::Int(1)])));
        let inner_alias = owner.with(|l| l.get(0).unwrap().clone());
        assert!(!inner_alias.is_unique());
        let helper = acquire(
            LvalueTarget::ListIndex { owner: &owner, index: 0 },
            DeclaredType::Any,
        );
        let mut sink = Sink::new();
        helper.ensure_unique(&mut sink);
        let after = helper.get();
        match (&after, &inner_alias) {
            (Value::List(a), Value::List(b)) => assert!(!a.ptr_eq(b)),
            _ => panic!("expected list values"),
        }
        inner_alias.deref(&mut sink);
        after.deref(&mut sink);
    }
}
