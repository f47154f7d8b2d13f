// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A small helper shared by every primitive's acquire protocol: block on a
//! `Condvar` for an optional timeout, reporting whether the wait timed out.

use std::sync::{Condvar, MutexGuard};
use std::time::Duration;

/// Waits on `cv` holding `guard`. With `timeout = None`, waits indefinitely
/// (never reports a timeout). With `Some(d)`, waits at most `d` and reports
/// whether the wait expired before being woken.
pub fn wait_on<'a, T>(
    cv: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Option<Duration>,
) -> (MutexGuard<'a, T>, bool) {
    match timeout {
        Some(duration) => {
            let (guard, result) = cv.wait_timeout(guard, duration).expect("condvar mutex poisoned");
            (guard, result.timed_out())
        }
        None => (cv.wait(guard).expect("condvar mutex poisoned"), false),
    }
}
