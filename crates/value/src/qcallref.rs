// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Bound-function references: a named, invocable handle onto a user-defined
//! function or method, distinct from a closure in that it carries no
//! captured locals, only an optional bound receiver.
//!
//! Same type-erasure shape as [`crate::qclosure::QClosure`]; `vellum-eval`
//! supplies the invocation callback since it owns function bodies.

use std::fmt;
use std::sync::Arc;

use vellum_exceptions::Sink;

use crate::envelope::HeapDestroy;
use crate::qobject::QObject;
use crate::{StrongRef, Value, WeakRef};

pub type CallRefFn = dyn Fn(Option<WeakRef<QObject>>, Vec<Value>, &mut Sink<Value>) -> Value + Send + Sync;

/// A reference to a named callable: either a free function, or a method
/// already bound to a receiver object (`bound_self`).
pub struct QCallRef {
    name: String,
    bound_self: Option<WeakRef<QObject>>,
    invoke: Arc<CallRefFn>,
}

impl QCallRef {
    #[must_use]
    pub fn new(name: impl Into<String>, bound_self: Option<WeakRef<QObject>>, invoke: Arc<CallRefFn>) -> Self {
        Self {
            name: name.into(),
            bound_self,
            invoke,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound_self.is_some()
    }

    /// Rebinds this callref's receiver, returning a fresh callref (used by
    /// the `&class::method` binding operator over an existing object).
    #[must_use]
    pub fn rebind(&self, receiver: WeakRef<QObject>) -> StrongRef<QCallRef> {
        StrongRef::new(Self {
            name: self.name.clone(),
            bound_self: Some(receiver),
            invoke: Arc::clone(&self.invoke),
        })
    }

    pub fn call(&self, args: Vec<Value>, sink: &mut Sink<Value>) -> Value {
        (self.invoke)(self.bound_self.clone(), args, sink)
    }
}

impl fmt::Debug for QCallRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QCallRef")
            .field("name", &self.name)
            .field("bound", &self.bound_self.is_some())
            .finish_non_exhaustive()
    }
}

impl HeapDestroy for QCallRef {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_callref_reports_unbound() {
        let callref = QCallRef::new("helper", None, Arc::new(|_self, args, _sink| {
            args.into_iter().next().unwrap_or(Value::Nothing)
        }));
        assert!(!callref.is_bound());
        assert_eq!(callref.name(), "helper");
    }

    #[test]
    fn test_call_forwards_args() {
        let callref = QCallRef::new("double", None, Arc::new(|_self, args, _sink| {
            match args.into_iter().next() {
                Some(Value::Int(n)) => Value::Int(n * 2),
                _ => Value::Nothing,
            }
        }));
        let mut sink: Sink<Value> = Sink::new();
        let result = callref.call(vec![Value::Int(21)], &mut sink);
        assert!(matches!(result, Value::Int(42)));
    }
}
