// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The concurrency substrate: the family of blocking synchronization
//! primitives (§4.4.1) plus the cross-primitive deadlock detector (§4.4.2)
//! that works across all of them.
//!
//! Every primitive shares the common `{unlocked, held, deleted}` state
//! machine ([`state`]) and registers itself with the process-wide
//! [`registry`] so [`deadlock::detect_deadlock`] can walk any thread's
//! wait-for chain without knowing the concrete primitive type it's blocked
//! on.
//!
//! This crate knows nothing about [`vellum_value::Value`] or the exception
//! [`vellum_exceptions::Sink`] — every fallible operation returns a
//! [`error::SyncError`] carrying a stable [`vellum_exceptions::ErrorKind`];
//! `vellum-eval` is responsible for raising that into the calling thread's
//! sink.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

use std::time::Duration;

use crate::error::SyncError;
use crate::registry::Tid;

mod condition;
mod counter;
mod deadlock;
mod error;
mod gate;
mod mutex;
mod queue;
mod registry;
mod rmutex;
mod rwlock;
mod state;
mod wait;

pub use crate::condition::Condition;
pub use crate::counter::Counter;
pub use crate::deadlock::{detect_deadlock, DeadlockInfo};
pub use crate::error::SyncError as Error;
pub use crate::gate::{Gate, PartyId};
pub use crate::mutex::Mutex;
pub use crate::queue::Queue;
pub use crate::registry::{
    next_primitive_id, register_primitive, register_thread, unregister_primitive, unregister_thread,
    vlock_for, OwnerQuery, PrimitiveId, Tid as ThreadId, VLock, NOBODY,
};
pub use crate::rmutex::RMutex;
pub use crate::rwlock::{Preference, RwLock, RwLockReadHandle, RwLockWriteHandle};
pub use crate::state::{PrimitiveState, PrimitiveTrigger};

/// A `0` from the host-facing millisecond API means "no timeout"; every
/// public acquire/wait method instead takes `Option<Duration>` so that
/// mapping happens once, at the `vellum-runtime` boundary.
#[must_use]
pub fn timeout_from_millis(millis: u64) -> Option<Duration> {
    if millis == vellum_core::consts::NO_TIMEOUT_MS {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

/// Implemented by any primitive a [`Condition`] can wait against: releasing
/// it for the wait and re-acquiring it in the same mode afterward.
pub trait Waitable: Send + Sync {
    fn release_for_wait(&self, tid: Tid) -> Result<(), SyncError>;
    fn reacquire_after_wait(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_millis_zero_is_none() {
        assert!(timeout_from_millis(0).is_none());
    }

    #[test]
    fn test_timeout_from_millis_nonzero_is_some() {
        assert_eq!(timeout_from_millis(50), Some(Duration::from_millis(50)));
    }
}
