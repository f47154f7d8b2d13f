// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Lvalue resolution: locked storage cells for assignment, read-through
//! access, and copy-on-write.
//!
//! An lvalue is never a long-lived object — it is built, used for one
//! statement's worth of access, and dropped. [`acquire`] resolves a
//! [`LvalueTarget`] (built by the evaluator from a variable, member access,
//! hash key, or list index expression) into a [`LvalueHelper`] that type-
//! checks assignment against a [`DeclaredType`] and supports the
//! copy-on-write and removal operations the operator semantics need.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod declared_type;
mod helper;
mod slot;
mod target;

pub use crate::declared_type::DeclaredType;
pub use crate::helper::{acquire, LvalueHelper};
pub use crate::slot::LocalSlot;
pub use crate::target::LvalueTarget;
