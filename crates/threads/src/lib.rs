// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Per-thread execution state: TID allocation, the exception sink, the
//! self/implicit-argument stacks, and the thread-resource cleanup registry
//! that guarantees every lock/transaction/socket a thread still holds is
//! forcibly released when it exits.
//!
//! A host thread calls [`ThreadContext::attach`] once on entry (re-entrant
//! calls on the same thread are cheap no-ops that share the existing
//! context); dropping the returned [`ThreadHandle`] unregisters the thread
//! from the deadlock detector and runs any still-live resource cleanup.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod context;
mod resource;

pub use crate::context::{current, ThreadContext, ThreadHandle};
pub use crate::resource::{ResourceId, ResourceRegistry, ThreadResource};

pub use vellum_sync::ThreadId as Tid;
