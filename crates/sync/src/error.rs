// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The error type every lock primitive operation returns.

use vellum_exceptions::ErrorKind;

/// An error raised by a `vellum-sync` primitive operation.
///
/// Carries a stable [`ErrorKind`] (never a user exception — the concurrency
/// substrate never throws arbitrary language values) plus a human-readable
/// description. Callers in `vellum-eval` convert this into the current
/// thread's `Sink` via `sink.raise_system(err.kind, err.description)`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {description}")]
pub struct SyncError {
    pub kind: ErrorKind,
    pub description: String,
}

impl SyncError {
    #[must_use]
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn lock_error(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::LockError, description)
    }
}
