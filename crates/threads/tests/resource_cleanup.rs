// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Spec §4.6: a thread that exits while still holding a lock gets that lock
//! forcibly released by the resource registry, with an exception describing
//! the forced release pushed to the default handler sink — here simulated
//! by a plain sink passed to `cleanup` directly, since the thread's own sink
//! is already torn down by the time cleanup runs.

use std::sync::Arc;

use vellum_exceptions::ErrorKind;
use vellum_sync::Mutex;
use vellum_threads::{ResourceRegistry, ThreadResource};
use vellum_value::Sink;

#[derive(Debug)]
struct HeldLock {
    mutex: Arc<Mutex>,
    tid: i64,
}

impl ThreadResource for HeldLock {
    fn cleanup(&self, sink: &mut Sink) {
        if self.mutex.release(self.tid).is_err() {
            sink.raise_system(
                ErrorKind::LockError,
                "lock forcibly released on thread exit",
            );
        }
    }
}

#[test]
fn test_registry_force_releases_held_lock_on_cleanup() {
    let tid = 51001;
    let _vlock = vellum_sync::register_thread(tid);

    let mutex = Mutex::new();
    mutex.acquire(tid, None).expect("initial acquire succeeds");

    let registry = ResourceRegistry::new();
    registry.register(
        1,
        Arc::new(HeldLock {
            mutex: Arc::clone(&mutex),
            tid,
        }),
    );

    let mut sink = Sink::new();
    registry.cleanup_all(&mut sink);

    assert!(registry.is_empty());
    // The mutex was released by cleanup, so a fresh thread can now acquire it.
    let other_tid = 51002;
    let _other_vlock = vellum_sync::register_thread(other_tid);
    assert!(mutex.acquire(other_tid, None).is_ok());
    mutex.release(other_tid).unwrap();

    vellum_sync::unregister_thread(tid);
    vellum_sync::unregister_thread(other_tid);
}
