// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A bounded (optionally unbounded) blocking FIFO of values (spec §4.4.1,
//! §4.4.5).
//!
//! Generic over the element type `T` so this crate never depends on
//! `vellum-value`; `vellum-eval` instantiates `Queue<vellum_value::Value>`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use vellum_exceptions::ErrorKind;

use crate::error::SyncError;
use crate::registry::{self, OwnerQuery, PrimitiveId, Tid};
use crate::wait::wait_on;

struct Inner<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
    deleted: bool,
    read_waiters: u32,
    write_waiters: u32,
    /// Bumped by `clear()` so a consumer parked on `not_empty` can tell a
    /// clear happened while it slept apart from a real push waking it.
    clear_epoch: u64,
}

/// A producer/consumer queue. `push`/`insert` block when at capacity;
/// `shift`/`pop` block when empty. `clear` unblocks consumers without
/// failing them (they observe an empty queue, i.e. `nothing`); `destroy`
/// unblocks and fails everyone with `QUEUE-ERROR`.
pub struct Queue<T> {
    id: PrimitiveId,
    state: StdMutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().expect("queue poisoned");
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("len", &guard.items.len())
            .field("capacity", &guard.capacity)
            .finish()
    }
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Arc<Self> {
        let id = registry::next_primitive_id();
        let this = Arc::new(Self {
            id,
            state: StdMutex::new(Inner {
                items: VecDeque::new(),
                capacity,
                deleted: false,
                read_waiters: 0,
                write_waiters: 0,
                clear_epoch: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        });
        registry::register_primitive(id, Arc::clone(&this) as Arc<dyn OwnerQuery>);
        this
    }

    #[must_use]
    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue poisoned").items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes onto the back, blocking while at capacity.
    pub fn push(&self, value: T, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.insert_at(value, true, timeout)
    }

    /// Pushes onto the front, blocking while at capacity.
    pub fn push_front(&self, value: T, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.insert_at(value, false, timeout)
    }

    fn insert_at(&self, value: T, back: bool, timeout: Option<Duration>) -> Result<(), SyncError> {
        let mut guard = self.state.lock().expect("queue poisoned");
        loop {
            if guard.deleted {
                return Err(SyncError::new(ErrorKind::QueueError, "operation on a deleted queue"));
            }
            let at_capacity = guard.capacity.is_some_and(|cap| guard.items.len() >= cap);
            if !at_capacity {
                if back {
                    guard.items.push_back(value);
                } else {
                    guard.items.push_front(value);
                }
                drop(guard);
                self.not_empty.notify_one();
                return Ok(());
            }
            guard.write_waiters += 1;
            let (next_guard, timed_out) = wait_on(&self.not_full, guard, timeout);
            guard = next_guard;
            guard.write_waiters -= 1;
            if timed_out {
                return Err(SyncError::new(ErrorKind::QueueError, "push timed out at capacity"));
            }
        }
    }

    /// Removes and returns the front element, blocking while empty.
    pub fn shift(&self, timeout: Option<Duration>) -> Result<Option<T>, SyncError> {
        let mut guard = self.state.lock().expect("queue poisoned");
        loop {
            if guard.deleted {
                return Err(SyncError::new(ErrorKind::QueueError, "operation on a deleted queue"));
            }
            if let Some(value) = guard.items.pop_front() {
                drop(guard);
                self.not_full.notify_one();
                return Ok(Some(value));
            }
            let epoch = guard.clear_epoch;
            guard.read_waiters += 1;
            let (next_guard, timed_out) = wait_on(&self.not_empty, guard, timeout);
            guard = next_guard;
            guard.read_waiters -= 1;
            if guard.deleted {
                return Err(SyncError::new(ErrorKind::QueueError, "queue deleted while waiting"));
            }
            if guard.clear_epoch != epoch {
                return Ok(None);
            }
            if timed_out {
                return Err(SyncError::new(ErrorKind::QueueError, "shift timed out on empty queue"));
            }
        }
    }

    /// Removes and returns the back element, blocking while empty.
    pub fn pop(&self, timeout: Option<Duration>) -> Result<Option<T>, SyncError> {
        let mut guard = self.state.lock().expect("queue poisoned");
        loop {
            if guard.deleted {
                return Err(SyncError::new(ErrorKind::QueueError, "operation on a deleted queue"));
            }
            if let Some(value) = guard.items.pop_back() {
                drop(guard);
                self.not_full.notify_one();
                return Ok(Some(value));
            }
            let epoch = guard.clear_epoch;
            guard.read_waiters += 1;
            let (next_guard, timed_out) = wait_on(&self.not_empty, guard, timeout);
            guard = next_guard;
            guard.read_waiters -= 1;
            if guard.deleted {
                return Err(SyncError::new(ErrorKind::QueueError, "queue deleted while waiting"));
            }
            if guard.clear_epoch != epoch {
                return Ok(None);
            }
            if timed_out {
                return Err(SyncError::new(ErrorKind::QueueError, "pop timed out on empty queue"));
            }
        }
    }

    /// Drains all elements, non-blocking, and unblocks waiting consumers
    /// (they simply observe the now-empty queue, not an error).
    pub fn clear(&self) {
        let mut guard = self.state.lock().expect("queue poisoned");
        guard.items.clear();
        guard.clear_epoch = guard.clear_epoch.wrapping_add(1);
        drop(guard);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Destroys the queue: every blocked waiter wakes and fails.
    pub fn destroy(&self) {
        let mut guard = self.state.lock().expect("queue poisoned");
        guard.deleted = true;
        guard.items.clear();
        drop(guard);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        registry::unregister_primitive(self.id);
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        registry::unregister_primitive(self.id);
    }
}

impl<T: Send + Sync> OwnerQuery for Queue<T> {
    fn current_owners(&self) -> Vec<Tid> {
        // A queue has no holder TID; producers/consumers are not "owners".
        Vec::new()
    }

    fn kind_name(&self) -> &'static str {
        "Queue"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q: Arc<Queue<i64>> = Queue::new(None);
        q.push(1, None).unwrap();
        q.push(2, None).unwrap();
        q.push(3, None).unwrap();
        assert_eq!(q.shift(None).unwrap(), Some(1));
        assert_eq!(q.shift(None).unwrap(), Some(2));
        assert_eq!(q.shift(None).unwrap(), Some(3));
    }

    #[test]
    fn test_capacity_blocks_then_timeout() {
        let q: Arc<Queue<i64>> = Queue::new(Some(1));
        q.push(1, None).unwrap();
        let err = q.push(2, Some(Duration::from_millis(20))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueError);
    }

    #[test]
    fn test_clear_is_non_blocking_and_empties_queue() {
        let q: Arc<Queue<i64>> = Queue::new(None);
        q.push(1, None).unwrap();
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn test_clear_wakes_blocked_consumer_with_nothing() {
        let q: Arc<Queue<i64>> = Queue::new(None);
        let q2 = Arc::clone(&q);
        let handle = std::thread::spawn(move || q2.shift(Some(Duration::from_secs(2))));
        // Give the consumer a chance to park on `not_empty` before clearing.
        std::thread::sleep(Duration::from_millis(50));
        q.clear();
        assert_eq!(handle.join().unwrap().unwrap(), None);
    }

    #[test]
    fn test_destroy_fails_pending_operations() {
        let q: Arc<Queue<i64>> = Queue::new(None);
        q.destroy();
        let err = q.push(1, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueError);
    }
}
