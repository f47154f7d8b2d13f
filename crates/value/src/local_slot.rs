// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Local-variable and static-class-variable storage cells.
//!
//! A [`LocalSlot`] is the language's "local slot" from spec §3's data model:
//! a single mutable storage location. It's a plain `Arc<RwLock<Value>>`
//! rather than something owned by a scope map, specifically so a closure can
//! capture it by reference (`&` capture per the background-expression rule)
//! without also capturing the scope it came from.
//!
//! Lives in `vellum-value` rather than `vellum-lvalue` so that
//! [`crate::reference::QReference`] (a first-class `Value` capturing an
//! unresolved lvalue) can name a captured local slot directly; the lvalue
//! engine's acquire/assign protocol is layered on top in `vellum-lvalue`.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::Value;

/// A single local or static-class-variable storage cell.
#[derive(Clone)]
pub struct LocalSlot(Arc<RwLock<Value>>);

impl fmt::Debug for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSlot").finish_non_exhaustive()
    }
}

impl Default for LocalSlot {
    fn default() -> Self {
        Self::new(Value::Nothing)
    }
}

impl LocalSlot {
    #[must_use]
    pub fn new(initial: Value) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// A read-only snapshot without acquiring the lvalue engine's full
    /// acquire/assign protocol; used by the evaluator for plain (non-lvalue)
    /// reads of a variable.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.0.read().expect("local slot poisoned").clone()
    }

    /// True if this and `other` are the same underlying storage cell (the
    /// identity a closure capture or an `&`-reference needs to preserve).
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Acquires the write lock directly. Low-level: only `vellum-lvalue`'s
    /// acquire/assign protocol should call this outside of this crate's own
    /// tests; ordinary reads should use [`LocalSlot::peek`].
    pub fn lock(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write().expect("local slot poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_reads_current_value() {
        let slot = LocalSlot::new(Value::Int(7));
        assert!(matches!(slot.peek(), Value::Int(7)));
    }

    #[test]
    fn test_clone_shares_identity() {
        let slot = LocalSlot::new(Value::Int(1));
        let captured = slot.clone();
        assert!(slot.ptr_eq(&captured));
        *slot.lock() = Value::Int(2);
        assert!(matches!(captured.peek(), Value::Int(2)));
    }
}
