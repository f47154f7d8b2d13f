// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The tagged-union value type every expression in the language evaluates to.

use vellum_exceptions::Sink;

use crate::envelope::{StrongRef, WeakRef};
use crate::qobject::WeakObjectRef;
use crate::{QBinary, QCallRef, QClosure, QDate, QHash, QList, QObject, QRegex, QReference, QString};

/// A single Vellum runtime value.
///
/// Heap-backed variants (`String`, `Binary`, `List`, `Hash`, `Object`) hold a
/// [`StrongRef`]; cloning a `Value` is the `ref()` of the data-model
/// contract (it increments the backing envelope's strong count rather than
/// deep-copying), and [`Value::deref`] is the matching `deref(sink)`.
#[derive(Debug)]
pub enum Value {
    /// The absence of a value (an unset optional, a missing hash key).
    Nothing,
    /// An explicit SQL-style null, distinct from `Nothing`.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(QDate),
    String(StrongRef<QString>),
    Binary(StrongRef<QBinary>),
    List(StrongRef<QList>),
    Hash(StrongRef<QHash>),
    Object(StrongRef<QObject>),
    /// A function literal with captured state, or a bound/unbound method
    /// handle. Call behavior is injected from `vellum-eval`; see
    /// [`QClosure`]/[`QCallRef`].
    Closure(StrongRef<QClosure>),
    CallRef(StrongRef<QCallRef>),
    Regex(StrongRef<QRegex>),
    /// `&expr`: a first-class handle onto an unresolved storage location.
    /// See [`QReference`].
    Reference(StrongRef<QReference>),
    WeakList(WeakRef<QList>),
    WeakHash(WeakRef<QHash>),
    WeakObject(WeakObjectRef),
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Nothing => Value::Nothing,
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::Date(d) => Value::Date(*d),
            Value::String(s) => Value::String(s.dup()),
            Value::Binary(b) => Value::Binary(b.dup()),
            Value::List(l) => Value::List(l.dup()),
            Value::Hash(h) => Value::Hash(h.dup()),
            Value::Object(o) => Value::Object(o.dup()),
            Value::Closure(c) => Value::Closure(c.dup()),
            Value::CallRef(c) => Value::CallRef(c.dup()),
            Value::Regex(r) => Value::Regex(r.dup()),
            Value::Reference(r) => Value::Reference(r.dup()),
            Value::WeakList(w) => Value::WeakList(w.clone()),
            Value::WeakHash(w) => Value::WeakHash(w.clone()),
            Value::WeakObject(w) => Value::WeakObject(w.clone()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nothing
    }
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(StrongRef::new(QString::new(s)))
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(StrongRef::new(QList::from_vec(items)))
    }

    #[must_use]
    pub fn hash(hash: QHash) -> Self {
        Value::Hash(StrongRef::new(hash))
    }

    #[must_use]
    pub fn object(obj: QObject) -> Self {
        Value::Object(StrongRef::new(obj))
    }

    /// The stable type name used in error messages and `RUNTIME-TYPE-ERROR`
    /// descriptions.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Date(_) => "date",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Object(_) => "object",
            Value::Closure(_) => "closure",
            Value::CallRef(_) => "callref",
            Value::Regex(_) => "regex",
            Value::Reference(_) => "reference",
            Value::WeakList(_) => "list (weak)",
            Value::WeakHash(_) => "hash (weak)",
            Value::WeakObject(_) => "object (weak)",
        }
    }

    /// `is_unique()`: true for scalars (never shared), and for heap variants
    /// iff their strong count is one.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        match self {
            Value::String(s) => s.is_unique(),
            Value::Binary(b) => b.is_unique(),
            Value::List(l) => l.is_unique(),
            Value::Hash(h) => h.is_unique(),
            Value::Object(o) => o.is_unique(),
            Value::Closure(c) => c.is_unique(),
            Value::CallRef(c) => c.is_unique(),
            Value::Regex(r) => r.is_unique(),
            Value::Reference(r) => r.is_unique(),
            _ => true,
        }
    }

    /// True for a weak reference whose target's strong count has reached
    /// zero. Always `false` for non-weak variants.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        match self {
            Value::WeakList(w) => w.is_deleted(),
            Value::WeakHash(w) => w.is_deleted(),
            Value::WeakObject(w) => w.is_deleted(),
            _ => false,
        }
    }

    /// `real_copy()`: deep-copies assignment-on-write heap types (strings,
    /// lists, hashes, binaries). Objects and weak references are never
    /// deep-copied; they are returned with their strong/weak count bumped
    /// like an ordinary `ref()`.
    #[must_use]
    pub fn real_copy(&self) -> Self {
        match self {
            Value::String(s) => Value::String(s.real_copy()),
            Value::Binary(b) => Value::Binary(b.real_copy()),
            Value::List(l) => Value::List(l.real_copy()),
            Value::Hash(h) => Value::Hash(h.real_copy()),
            other => other.clone(),
        }
    }

    /// `deref(sink)`: releases a strong handle, running the destructor if
    /// this was the last one. A no-op for scalars and weak references.
    pub fn deref(self, sink: &mut Sink<Value>) {
        match self {
            Value::String(s) => s.deref(sink),
            Value::Binary(b) => b.deref(sink),
            Value::List(l) => l.deref(sink),
            Value::Hash(h) => h.deref(sink),
            Value::Object(o) => o.deref(sink),
            Value::Closure(c) => c.deref(sink),
            Value::CallRef(c) => c.deref(sink),
            Value::Regex(r) => r.deref(sink),
            Value::Reference(r) => r.deref(sink),
            _ => {}
        }
    }

    /// Upgrades a weak reference to a strong one, or returns `Nothing` if the
    /// target has already been deleted. Non-weak variants pass through
    /// unchanged.
    #[must_use]
    pub fn upgrade(&self) -> Value {
        match self {
            Value::WeakList(w) => w.upgrade().map(Value::List).unwrap_or(Value::Nothing),
            Value::WeakHash(w) => w.upgrade().map(Value::Hash).unwrap_or(Value::Nothing),
            Value::WeakObject(w) => w.upgrade().map(Value::Object).unwrap_or(Value::Nothing),
            other => other.clone(),
        }
    }

    /// Takes a weak reference to a heap value. Returns the value unchanged
    /// for scalars, which have no weak-reference concept.
    #[must_use]
    pub fn downgrade(&self) -> Value {
        match self {
            Value::List(l) => Value::WeakList(l.downgrade()),
            Value::Hash(h) => Value::WeakHash(h.downgrade()),
            Value::Object(o) => Value::WeakObject(QObject::downgrade_named(o)),
            other => other.clone(),
        }
    }

    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_ref_not_deep_copy() {
        let v = Value::string("hello");
        let cloned = v.clone();
        assert!(!v.is_unique());
        assert!(!cloned.is_unique());
    }

    #[test]
    fn test_real_copy_produces_independent_string() {
        let v = Value::string("hello");
        let copy = v.real_copy();
        assert!(v.is_unique());
        assert!(copy.is_unique());
    }

    #[test]
    fn test_downgrade_then_upgrade_roundtrips() {
        let v = Value::list(vec![Value::Int(1)]);
        let weak = v.downgrade();
        assert!(!weak.is_deleted());
        let upgraded = weak.upgrade();
        assert!(matches!(upgraded, Value::List(_)));
    }

    #[test]
    fn test_weak_reports_deleted_after_last_strong_deref() {
        let v = Value::list(vec![Value::Int(1)]);
        let weak = v.downgrade();
        let mut sink = Sink::new();
        v.deref(&mut sink);
        assert!(weak.is_deleted());
        assert!(matches!(weak.upgrade(), Value::Nothing));
    }
}
