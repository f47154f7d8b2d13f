// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Process-wide constants.

/// A sentinel meaning "no timeout" for any wait/acquire operation across
/// `vellum-sync`, expressed in milliseconds per the host-facing API.
pub const NO_TIMEOUT_MS: u64 = 0;

/// The special thread id meaning "nobody", used as the `code` sentinel on an
/// unlocked [`crate::fsm`]-backed primitive before any thread owns it.
pub const TID_NOBODY: i64 = -1;
