// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The resolved storage-cell descriptor an [`crate::acquire`] call locks.
//!
//! Building a [`LvalueTarget`] is the evaluator's job: it walks the
//! expression (variable, member access, index, static class variable,
//! dereferenced reference) and turns it into one of these four terminal
//! shapes. Only the terminal container is locked by this crate — each
//! intermediate hop along the way is an ordinary `ref()`'d handle, not a
//! held lock, so there is only ever one lock in play per `acquire` call
//! rather than a chain.

use vellum_value::{LocalSlot, QHash, QList, QObject, StrongRef};

/// A resolved, not-yet-locked storage cell.
///
/// Borrows the terminal container for the lifetime of the acquisition rather
/// than taking its own strong handle: the caller (the evaluator) already
/// holds whatever reference keeps the container alive for the duration of
/// the statement being evaluated.
#[derive(Debug)]
pub enum LvalueTarget<'a> {
    /// A local variable or static class variable; `LocalSlot` is a cheap
    /// `Arc` clone, so this variant owns one rather than borrowing.
    Local(LocalSlot),
    Member { owner: &'a StrongRef<QObject>, name: String },
    HashKey { owner: &'a StrongRef<QHash>, key: String },
    ListIndex { owner: &'a StrongRef<QList>, index: usize },
}

impl LvalueTarget<'_> {
    /// The cell's kind, for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            LvalueTarget::Local(_) => "local",
            LvalueTarget::Member { .. } => "member",
            LvalueTarget::HashKey { .. } => "hash key",
            LvalueTarget::ListIndex { .. } => "list index",
        }
    }
}
