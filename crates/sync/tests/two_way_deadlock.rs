// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Spec §8 scenario 1: T1 holds M1 and blocks acquiring M2; T2 holds M2 and
//! blocks acquiring M1. Exactly one of the two second acquires must fail with
//! `THREAD-DEADLOCK`; the other completes once the loser releases its hold.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use vellum_exceptions::ErrorKind;
use vellum_sync::{register_thread, unregister_thread, Mutex};

#[test]
fn exactly_one_second_acquire_is_rejected_as_deadlock() {
    let tid1 = 41001;
    let tid2 = 41002;
    let _v1 = register_thread(tid1);
    let _v2 = register_thread(tid2);

    let m1 = Mutex::new();
    let m2 = Mutex::new();
    let barrier = Arc::new(Barrier::new(2));

    let (m1a, m2a, barrier_a) = (Arc::clone(&m1), Arc::clone(&m2), Arc::clone(&barrier));
    let t1 = thread::spawn(move || {
        m1a.acquire(tid1, None).unwrap();
        barrier_a.wait();
        let result = m2a.acquire(tid1, Some(Duration::from_secs(2)));
        if result.is_ok() {
            m2a.release(tid1).unwrap();
        }
        m1a.release(tid1).unwrap();
        result
    });

    let (m1b, m2b, barrier_b) = (Arc::clone(&m1), Arc::clone(&m2), Arc::clone(&barrier));
    let t2 = thread::spawn(move || {
        m2b.acquire(tid2, None).unwrap();
        barrier_b.wait();
        let result = m1b.acquire(tid2, Some(Duration::from_secs(2)));
        if result.is_ok() {
            m1b.release(tid2).unwrap();
        }
        m2b.release(tid2).unwrap();
        result
    });

    let r1 = t1.join().expect("thread 1 panicked");
    let r2 = t2.join().expect("thread 2 panicked");

    // Exactly one side wins (completes its second acquire), the other loses.
    assert_ne!(r1.is_ok(), r2.is_ok(), "exactly one second acquire must fail");

    let loser = if r1.is_err() { r1 } else { r2 };
    assert_eq!(loser.unwrap_err().kind, ErrorKind::ThreadDeadlock);

    unregister_thread(tid1);
    unregister_thread(tid2);
}
