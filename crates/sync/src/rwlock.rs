// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A reader/writer lock with a configurable reader/writer preference (spec
//! §4.4.4).
//!
//! Per spec §9's resolution of the open question on release ordering: writer
//! holds (and every other primitive in this crate) require LIFO release, but
//! a thread holding multiple read locks may release them in any order — read
//! holds are tracked per-TID by count, not by vlock stack position, so
//! `RwLock::unlock_read` never consults [`crate::registry::VLock::remove_held`]'s
//! LIFO-ness result.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use vellum_exceptions::ErrorKind;

use crate::deadlock::check_and_register_wait;
use crate::error::SyncError;
use crate::registry::{self, OwnerQuery, PrimitiveId, Tid};
use crate::state::{new_fsm, PrimitiveState, PrimitiveTrigger};
use crate::wait::wait_on;
use crate::Waitable;

/// Selects which side is favored when both a waiting writer and an
/// incoming reader are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    /// A reader enters as long as no writer currently holds the lock, even if
    /// writers are waiting. This is the default (spec §4.4.4).
    #[default]
    ReaderPreferred,
    /// A reader blocks if any writer is waiting, unless the calling thread
    /// already holds a read lock (recursive read is always admitted).
    WriterPreferred,
}

struct Inner {
    fsm: vellum_core::fsm::FiniteStateMachine<PrimitiveState, PrimitiveTrigger>,
    writer: Option<Tid>,
    readers: HashMap<Tid, u32>,
    waiting_writers: u32,
}

impl Inner {
    fn num_readers(&self) -> usize {
        self.readers.len()
    }
}

/// A reader/writer lock: one writer XOR N concurrent readers.
pub struct RwLock {
    id: PrimitiveId,
    preference: Preference,
    state: StdMutex<Inner>,
    cv: Condvar,
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("rwlock poisoned");
        f.debug_struct("RwLock")
            .field("id", &self.id)
            .field("preference", &self.preference)
            .field("writer", &guard.writer)
            .field("readers", &guard.readers.len())
            .finish()
    }
}

impl RwLock {
    #[must_use]
    pub fn new(preference: Preference) -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            preference,
            state: StdMutex::new(Inner {
                fsm: new_fsm(),
                writer: None,
                readers: HashMap::new(),
                waiting_writers: 0,
            }),
            cv: Condvar::new(),
        });
        registry::register_primitive(id, Arc::clone(&this) as Arc<dyn OwnerQuery>);
        this
    }

    #[must_use]
    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    /// Acquires a read lock. Recursive read (the calling thread already
    /// holds one) is always admitted regardless of preference policy.
    pub fn lock_read(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("rwlock poisoned");
        loop {
            if guard.fsm.state() == PrimitiveState::Deleted {
                return Err(SyncError::lock_error("operation on a deleted rwlock"));
            }
            let already_reading = guard.readers.contains_key(&tid);
            let admit = guard.writer.is_none()
                && (already_reading
                    || self.preference == Preference::ReaderPreferred
                    || guard.waiting_writers == 0);
            if admit {
                if guard.fsm.state() == PrimitiveState::Unlocked {
                    guard.fsm.trigger(PrimitiveTrigger::Acquire);
                }
                *guard.readers.entry(tid).or_insert(0) += 1;
                let first_hold = guard.readers[&tid] == 1;
                drop(guard);
                if first_hold {
                    if let Some(vlock) = registry::vlock_for(tid) {
                        vlock.push_held(self.id);
                    }
                }
                return Ok(());
            }
            if let Err(info) = check_and_register_wait(tid, self.id) {
                return Err(SyncError::new(ErrorKind::ThreadDeadlock, info.describe()));
            }
            let (next_guard, timed_out) = wait_on(&self.cv, guard, timeout);
            guard = next_guard;
            if let Some(vlock) = registry::vlock_for(tid) {
                vlock.set_waiting(None);
            }
            if timed_out {
                return Err(SyncError::lock_error("read acquire timed out"));
            }
        }
    }

    /// Releases one read hold; the per-TID read count need not be released
    /// in acquisition order (see the module-level note).
    pub fn unlock_read(&self, tid: Tid) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("rwlock poisoned");
        let Some(count) = guard.readers.get_mut(&tid) else {
            return Err(SyncError::lock_error("read-unlock by a thread that holds no read lock"));
        };
        *count -= 1;
        let last_hold = *count == 0;
        if last_hold {
            guard.readers.remove(&tid);
        }
        let unlocked = guard.readers.is_empty() && guard.writer.is_none();
        if unlocked && guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Release);
        }
        drop(guard);
        if last_hold {
            if let Some(vlock) = registry::vlock_for(tid) {
                vlock.remove_held(self.id);
            }
        }
        self.cv.notify_all();
        Ok(())
    }

    /// Acquires the write lock, waiting for both `readers == 0` and no other
    /// writer.
    pub fn lock_write(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("rwlock poisoned");
        loop {
            if guard.fsm.state() == PrimitiveState::Deleted {
                return Err(SyncError::lock_error("operation on a deleted rwlock"));
            }
            if guard.writer == Some(tid) {
                return Err(SyncError::lock_error("rwlock write side is not re-entrant"));
            }
            if guard.writer.is_none() && guard.num_readers() == 0 {
                if guard.fsm.state() == PrimitiveState::Unlocked {
                    guard.fsm.trigger(PrimitiveTrigger::Acquire);
                }
                guard.writer = Some(tid);
                drop(guard);
                if let Some(vlock) = registry::vlock_for(tid) {
                    vlock.push_held(self.id);
                }
                return Ok(());
            }
            if let Err(info) = check_and_register_wait(tid, self.id) {
                return Err(SyncError::new(ErrorKind::ThreadDeadlock, info.describe()));
            }
            guard.waiting_writers += 1;
            let (next_guard, timed_out) = wait_on(&self.cv, guard, timeout);
            guard = next_guard;
            guard.waiting_writers -= 1;
            if let Some(vlock) = registry::vlock_for(tid) {
                vlock.set_waiting(None);
            }
            if timed_out {
                return Err(SyncError::lock_error("write acquire timed out"));
            }
        }
    }

    /// Releases the write lock. Must be released by the holder; writer holds
    /// follow LIFO release like every other primitive in this crate.
    pub fn unlock_write(&self, tid: Tid) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("rwlock poisoned");
        if guard.writer != Some(tid) {
            return Err(SyncError::lock_error("write-unlock by a thread that does not hold the write lock"));
        }
        guard.writer = None;
        if guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Release);
        }
        drop(guard);
        if let Some(vlock) = registry::vlock_for(tid) {
            vlock.remove_held(self.id);
        }
        self.cv.notify_all();
        Ok(())
    }

    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("rwlock poisoned");
        if guard.fsm.state() != PrimitiveState::Deleted {
            guard.fsm.trigger(PrimitiveTrigger::Delete);
        }
        guard.writer = None;
        guard.readers.clear();
        drop(guard);
        self.cv.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl OwnerQuery for RwLock {
    fn current_owners(&self) -> Vec<Tid> {
        let guard = self.state.lock().expect("rwlock poisoned");
        if let Some(writer) = guard.writer {
            vec![writer]
        } else {
            guard.readers.keys().copied().collect()
        }
    }

    fn kind_name(&self) -> &'static str {
        "RwLock"
    }
}

/// `Condition::wait` against a read hold releases and reacquires the read
/// side; against a write hold it releases and reacquires the write side.
/// Since a bare `RwLock` cannot express "which mode was I holding", callers
/// wrap it in one of [`RwLockReadHandle`]/[`RwLockWriteHandle`] to make
/// [`Condition::wait`] unambiguous.
pub struct RwLockReadHandle(pub Arc<RwLock>);
pub struct RwLockWriteHandle(pub Arc<RwLock>);

impl Waitable for RwLockReadHandle {
    fn release_for_wait(&self, tid: Tid) -> Result<(), SyncError> {
        self.0.unlock_read(tid)
    }

    fn reacquire_after_wait(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.0.lock_read(tid, timeout)
    }
}

impl Waitable for RwLockWriteHandle {
    fn release_for_wait(&self, tid: Tid) -> Result<(), SyncError> {
        self.0.unlock_write(tid)
    }

    fn reacquire_after_wait(&self, tid: Tid, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.0.lock_write(tid, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_thread, unregister_thread};

    #[test]
    fn test_multiple_readers_admitted_concurrently() {
        let t1 = 8001;
        let t2 = 8002;
        let _v1 = register_thread(t1);
        let _v2 = register_thread(t2);
        let lock = RwLock::new(Preference::ReaderPreferred);
        lock.lock_read(t1, None).unwrap();
        lock.lock_read(t2, None).unwrap();
        assert_eq!(lock.current_owners().len(), 2);
        lock.unlock_read(t1).unwrap();
        lock.unlock_read(t2).unwrap();
        unregister_thread(t1);
        unregister_thread(t2);
    }

    #[test]
    fn test_recursive_read_always_admitted() {
        let t1 = 8003;
        let _v1 = register_thread(t1);
        let lock = RwLock::new(Preference::WriterPreferred);
        lock.lock_read(t1, None).unwrap();
        lock.lock_read(t1, None).unwrap();
        lock.unlock_read(t1).unwrap();
        assert_eq!(lock.current_owners(), vec![t1]);
        lock.unlock_read(t1).unwrap();
        assert!(lock.current_owners().is_empty());
        unregister_thread(t1);
    }

    #[test]
    fn test_write_excludes_readers() {
        let t1 = 8004;
        let _v1 = register_thread(t1);
        let lock = RwLock::new(Preference::ReaderPreferred);
        lock.lock_write(t1, None).unwrap();
        assert_eq!(lock.current_owners(), vec![t1]);
        lock.unlock_write(t1).unwrap();
        unregister_thread(t1);
    }

    #[test]
    fn test_out_of_order_read_release_permitted() {
        let t1 = 8005;
        let _v1 = register_thread(t1);
        let lock = RwLock::new(Preference::ReaderPreferred);
        lock.lock_read(t1, None).unwrap();
        lock.lock_read(t1, None).unwrap();
        // Releasing in the same "position" twice in a row is fine; a single
        // TID's read count is not stack-ordered.
        lock.unlock_read(t1).unwrap();
        lock.unlock_read(t1).unwrap();
        unregister_thread(t1);
    }
}
