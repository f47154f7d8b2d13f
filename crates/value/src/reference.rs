// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! First-class references: a `Value` that names an unresolved storage
//! location (a local variable, an object member, a hash key, or a list
//! index) rather than holding data directly.
//!
//! This crate only knows how to name a location and take a read-only
//! snapshot of it (`peek`); the full acquire/assign/ensure-unique protocol
//! that the lvalue engine performs against the named location lives in
//! `vellum-lvalue`, which matches on [`ReferenceTarget`] to resolve it.

use std::fmt;

use crate::envelope::HeapDestroy;
use crate::local_slot::LocalSlot;
use crate::qhash::QHash;
use crate::qlist::QList;
use crate::qobject::QObject;
use crate::{Value, WeakRef};

/// The storage location a [`QReference`] names.
///
/// All container targets are held weakly: a reference outlives neither the
/// container it points into nor the language's own ownership rules, and
/// dereferencing a target whose container has already been torn down simply
/// yields `Nothing` rather than an error.
#[derive(Clone)]
pub enum ReferenceTarget {
    Local(LocalSlot),
    Member { owner: WeakRef<QObject>, name: String },
    HashKey { owner: WeakRef<QHash>, key: String },
    ListIndex { owner: WeakRef<QList>, index: usize },
}

impl fmt::Debug for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("ReferenceTarget::Local"),
            Self::Member { name, .. } => {
                write!(f, "ReferenceTarget::Member({name})")
            }
            Self::HashKey { key, .. } => write!(f, "ReferenceTarget::HashKey({key})"),
            Self::ListIndex { index, .. } => write!(f, "ReferenceTarget::ListIndex({index})"),
        }
    }
}

/// A heap reference value: `&expr` over an lvalue, stored as a first-class
/// [`Value`].
#[derive(Debug, Clone)]
pub struct QReference {
    target: ReferenceTarget,
}

impl QReference {
    #[must_use]
    pub fn new(target: ReferenceTarget) -> Self {
        Self { target }
    }

    #[must_use]
    pub fn target(&self) -> &ReferenceTarget {
        &self.target
    }

    /// A read-only snapshot of the referenced location's current value.
    /// Returns `Nothing` if the referenced container has already been torn
    /// down, or the key/index is no longer present.
    #[must_use]
    pub fn peek(&self) -> Value {
        match &self.target {
            ReferenceTarget::Local(slot) => slot.peek(),
            ReferenceTarget::Member { owner, name } => owner
                .upgrade()
                .and_then(|obj| obj.with(|o| o.get_member(name)))
                .unwrap_or(Value::Nothing),
            ReferenceTarget::HashKey { owner, key } => owner
                .upgrade()
                .and_then(|hash| hash.with(|h| h.get(key).cloned()))
                .unwrap_or(Value::Nothing),
            ReferenceTarget::ListIndex { owner, index } => owner
                .upgrade()
                .and_then(|list| list.with(|l| l.get(*index).cloned()))
                .unwrap_or(Value::Nothing),
        }
    }

    /// True once the referenced container no longer exists; a dangling local
    /// reference (whose slot is kept alive by the `Arc` itself) is never
    /// considered dangling.
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        match &self.target {
            ReferenceTarget::Local(_) => false,
            ReferenceTarget::Member { owner, .. } => owner.is_deleted(),
            ReferenceTarget::HashKey { owner, .. } => owner.is_deleted(),
            ReferenceTarget::ListIndex { owner, .. } => owner.is_deleted(),
        }
    }
}

impl HeapDestroy for QReference {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrongRef;

    #[test]
    fn test_local_reference_peeks_current_value() {
        let slot = LocalSlot::new(Value::Int(3));
        let reference = QReference::new(ReferenceTarget::Local(slot.clone()));
        assert!(matches!(reference.peek(), Value::Int(3)));
        *slot.lock() = Value::Int(4);
        assert!(matches!(reference.peek(), Value::Int(4)));
    }

    #[test]
    fn test_hash_key_reference_dangles_after_owner_dropped() {
        let owner = StrongRef::new(QHash::new());
        let weak = owner.downgrade();
        let reference = QReference::new(ReferenceTarget::HashKey {
            owner: weak,
            key: "x".to_string(),
        });
        assert!(!reference.is_dangling());
        let mut sink = crate::Sink::new();
        owner.deref(&mut sink);
        assert!(reference.is_dangling());
        assert!(matches!(reference.peek(), Value::Nothing));
    }
}
