// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Re-exports [`vellum_value::LocalSlot`].
//!
//! `LocalSlot` lives in `vellum-value` (not here) so that
//! `vellum_value::QReference` can capture one directly without a dependency
//! cycle; this crate only adds the acquire/assign protocol on top of it.

pub use vellum_value::LocalSlot;
