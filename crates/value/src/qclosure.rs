// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Closure values.
//!
//! A closure's body is an AST node living in `vellum-eval`, which this crate
//! cannot depend on. As with [`crate::QObject`]'s destructor, the call
//! behavior is injected as a type-erased callback at construction time —
//! `vellum-eval` builds the callback by capturing an `Arc<Node>` plus the
//! rebound slots, and this crate only knows "calling a closure produces a
//! `Value`, given a sink for propagating exceptions."

use std::fmt;
use std::sync::Arc;

use vellum_exceptions::Sink;

use crate::envelope::HeapDestroy;
use crate::Value;

/// A closure's invocation behavior: called with the positional arguments and
/// the calling thread's sink, returns the closure body's result (or
/// `Value::Nothing` with the sink in the error state on an unwind other than
/// a plain return).
pub type ClosureFn = dyn Fn(Vec<Value>, &mut Sink<Value>) -> Value + Send + Sync;

/// A heap closure value: captured state is opaque to this crate (owned by
/// whatever built the [`ClosureFn`]); only `captured_count` is surfaced, for
/// diagnostics and the spec's `lvid_count` bookkeeping.
pub struct QClosure {
    invoke: Arc<ClosureFn>,
    captured_count: usize,
}

impl QClosure {
    #[must_use]
    pub fn new(captured_count: usize, invoke: Arc<ClosureFn>) -> Self {
        Self {
            invoke,
            captured_count,
        }
    }

    #[must_use]
    pub fn captured_count(&self) -> usize {
        self.captured_count
    }

    pub fn call(&self, args: Vec<Value>, sink: &mut Sink<Value>) -> Value {
        (self.invoke)(args, sink)
    }
}

impl fmt::Debug for QClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QClosure")
            .field("captured_count", &self.captured_count)
            .finish_non_exhaustive()
    }
}

impl HeapDestroy for QClosure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_invokes_captured_behavior() {
        let closure = QClosure::new(1, Arc::new(|args, _sink| args.into_iter().next().unwrap_or(Value::Nothing)));
        let mut sink: Sink<Value> = Sink::new();
        let result = closure.call(vec![Value::Int(5)], &mut sink);
        assert!(matches!(result, Value::Int(5)));
    }
}
