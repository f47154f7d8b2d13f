// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The heap envelope backing every reference-counted [`crate::Value`] variant.
//!
//! An [`Envelope<T>`] separates the *logical* strong/weak counts (which the
//! language's `ref()`/`deref()`/weak-reference semantics manipulate directly)
//! from Rust's own `Arc` bookkeeping, which only governs when the envelope's
//! backing allocation itself may be reclaimed. A weak handle keeps the
//! envelope alive via its `Arc` clone long after the logical strong count
//! reaches zero and the contents have been dropped, matching the "weak keeps
//! the pointer valid, not the contents" contract.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use vellum_exceptions::Sink;

use crate::Value;

/// Implemented by every type that can live inside a [`StrongRef`]/[`WeakRef`]
/// envelope. The default destructor is a silent drop; [`crate::QObject`]
/// overrides this to run a user-defined destructor that may raise into the
/// sink.
pub trait HeapDestroy: Sized {
    /// Runs when the logical strong count reaches zero. `sink` is the calling
    /// thread's exception channel; most implementors never touch it.
    fn on_destroy(self, sink: &mut Sink<Value>) {
        let _ = sink;
    }
}

struct Envelope<T> {
    contents: RwLock<Option<T>>,
    strong: AtomicUsize,
    weak: AtomicUsize,
}

impl<T> fmt::Debug for Envelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("strong", &self.strong.load(Ordering::Relaxed))
            .field("weak", &self.weak.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A strong (owning) handle to a heap value of type `T`.
///
/// Obtaining a new handle to the same underlying value is [`StrongRef::dup`]
/// (the `ref()` of the contract); releasing one is [`StrongRef::deref`]. Both
/// are explicit rather than implicit Clone/Drop because `deref` must be able
/// to run a type-specific destructor through the thread's [`Sink`] — letting
/// that happen implicitly during an ordinary drop (e.g. on a panicking
/// unwind) would run arbitrary user destructor code at a point the caller
/// does not control. [`Drop`] is still implemented as a backstop: a
/// [`StrongRef`] that is never explicitly `deref`'d still releases its
/// logical strong count and silently drops its contents rather than leaking.
pub struct StrongRef<T: HeapDestroy> {
    envelope: Arc<Envelope<T>>,
    released: bool,
}

impl<T: HeapDestroy + fmt::Debug> fmt::Debug for StrongRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongRef")
            .field("strong_count", &self.strong_count())
            .finish_non_exhaustive()
    }
}

impl<T: HeapDestroy> StrongRef<T> {
    /// Allocates a new envelope holding `value` with a strong count of one.
    pub fn new(value: T) -> Self {
        let envelope = Arc::new(Envelope {
            contents: RwLock::new(Some(value)),
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(0),
        });
        Self {
            envelope,
            released: false,
        }
    }

    /// `ref()`: atomically increments the strong count and returns a new
    /// handle to the same envelope.
    #[must_use]
    pub fn dup(&self) -> Self {
        self.envelope.strong.fetch_add(1, Ordering::AcqRel);
        Self {
            envelope: Arc::clone(&self.envelope),
            released: false,
        }
    }

    /// `deref(sink)`: atomically decrements the strong count; if it reaches
    /// zero, takes the contents and runs [`HeapDestroy::on_destroy`].
    pub fn deref(mut self, sink: &mut Sink<Value>) {
        self.released = true;
        if self.envelope.strong.fetch_sub(1, Ordering::AcqRel) == 1 {
            destroy(&self.envelope, sink);
        }
    }

    /// `is_unique()`: true iff the strong count is exactly one.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.strong_count() == 1
    }

    /// The current strong count.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.envelope.strong.load(Ordering::Acquire)
    }

    /// True if `self` and `other` are handles to the same envelope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.envelope, &other.envelope)
    }

    /// Creates a new weak handle to the same envelope.
    #[must_use]
    pub fn downgrade(&self) -> WeakRef<T> {
        self.envelope.weak.fetch_add(1, Ordering::AcqRel);
        WeakRef {
            envelope: Arc::clone(&self.envelope),
        }
    }

    /// Runs `f` against the contents. Panics if called on a handle whose
    /// contents were already taken, which cannot happen while any strong
    /// handle is alive.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.envelope.contents.read().expect("envelope lock poisoned");
        f(guard.as_ref().expect("strong handle outlived its contents"))
    }

    /// Runs `f` against the contents mutably.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.envelope.contents.write().expect("envelope lock poisoned");
        f(guard.as_mut().expect("strong handle outlived its contents"))
    }

    /// Takes and holds the envelope's write lock for the duration of the
    /// returned guard, rather than a single closure call. This is what the
    /// lvalue engine uses: it needs the container locked across several
    /// separate method calls (`get`, `assign`, `ensure_unique`, ...) before
    /// releasing it, not just for one synchronous operation.
    pub fn lock_mut(&self) -> ContentsGuard<'_, T> {
        let guard = self.envelope.contents.write().expect("envelope lock poisoned");
        ContentsGuard { guard }
    }
}

/// An RAII write lock over a [`StrongRef`]'s contents, obtained via
/// [`StrongRef::lock_mut`].
pub struct ContentsGuard<'a, T> {
    guard: RwLockWriteGuard<'a, Option<T>>,
}

impl<T> Deref for ContentsGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("strong handle outlived its contents")
    }
}

impl<T> DerefMut for ContentsGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("strong handle outlived its contents")
    }
}

impl<T: HeapDestroy + Clone> StrongRef<T> {
    /// `real_copy()`: deep-copies the contents into a fresh, independent
    /// envelope with a strong count of one.
    #[must_use]
    pub fn real_copy(&self) -> Self {
        Self::new(self.with(Clone::clone))
    }
}

impl<T: HeapDestroy> Drop for StrongRef<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.envelope.strong.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Ok(mut guard) = self.envelope.contents.write() {
                if guard.take().is_some() {
                    tracing::debug!("heap value dropped without an explicit deref; contents discarded silently");
                }
            }
        }
    }
}

fn destroy<T: HeapDestroy>(envelope: &Arc<Envelope<T>>, sink: &mut Sink<Value>) {
    let taken = envelope
        .contents
        .write()
        .expect("envelope lock poisoned")
        .take();
    if let Some(value) = taken {
        tracing::debug!("strong count reached zero, running destructor");
        value.on_destroy(sink);
    }
}

/// A weak (non-owning) handle to a heap value of type `T`.
///
/// Keeps the envelope's allocation alive so the handle is always safe to
/// inspect, but never keeps the contents alive: once the strong count
/// reaches zero the contents are gone and [`WeakRef::upgrade`] returns
/// `None` forever after (the envelope never comes back to life).
pub struct WeakRef<T: HeapDestroy> {
    envelope: Arc<Envelope<T>>,
}

impl<T: HeapDestroy + fmt::Debug> fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRef")
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}

impl<T: HeapDestroy> WeakRef<T> {
    /// True once the strong count has reached zero; reading a deleted weak
    /// reference is itself never an error.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.envelope.strong.load(Ordering::Acquire) == 0
    }

    /// True if `self` and `other` are handles to the same envelope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.envelope, &other.envelope)
    }

    /// Attempts to obtain a new strong handle, mirroring `optRef`: succeeds
    /// only if the strong count is still above zero at the moment of the
    /// attempt, and the increment is atomic with that check.
    #[must_use]
    pub fn upgrade(&self) -> Option<StrongRef<T>> {
        let mut current = self.envelope.strong.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            match self.envelope.strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(StrongRef {
                        envelope: Arc::clone(&self.envelope),
                        released: false,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl<T: HeapDestroy> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        self.envelope.weak.fetch_add(1, Ordering::AcqRel);
        Self {
            envelope: Arc::clone(&self.envelope),
        }
    }
}

impl<T: HeapDestroy> Drop for WeakRef<T> {
    fn drop(&mut self) {
        self.envelope.weak.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Probe(i64);
    impl HeapDestroy for Probe {}

    #[test]
    fn test_dup_increments_strong_count() {
        let a = StrongRef::new(Probe(1));
        let b = a.dup();
        assert_eq!(a.strong_count(), 2);
        assert_eq!(b.strong_count(), 2);
    }

    #[test]
    fn test_is_unique_true_only_with_one_handle() {
        let a = StrongRef::new(Probe(1));
        assert!(a.is_unique());
        let b = a.dup();
        assert!(!a.is_unique());
        let mut sink = Sink::new();
        b.deref(&mut sink);
        assert!(a.is_unique());
    }

    #[test]
    fn test_weak_upgrade_fails_after_strong_count_reaches_zero() {
        let a = StrongRef::new(Probe(7));
        let weak = a.downgrade();
        assert!(!weak.is_deleted());
        let mut sink = Sink::new();
        a.deref(&mut sink);
        assert!(weak.is_deleted());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_weak_upgrade_succeeds_while_strong_alive() {
        let a = StrongRef::new(Probe(9));
        let weak = a.downgrade();
        let upgraded = weak.upgrade().expect("should upgrade");
        assert_eq!(a.strong_count(), 2);
        let mut sink = Sink::new();
        upgraded.deref(&mut sink);
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn test_real_copy_is_independent_envelope() {
        let a = StrongRef::new(Probe(5));
        let copy = a.real_copy();
        assert!(a.is_unique());
        assert!(copy.is_unique());
        copy.with_mut(|p| p.0 = 99);
        assert_eq!(a.with(|p| p.0), 5);
    }

    #[test]
    fn test_drop_without_explicit_deref_does_not_panic() {
        let a = StrongRef::new(Probe(1));
        drop(a);
    }

    #[test]
    fn test_lock_mut_holds_across_multiple_accesses() {
        let a = StrongRef::new(Probe(1));
        let mut guard = a.lock_mut();
        guard.0 = 2;
        assert_eq!(guard.0, 2);
        drop(guard);
        assert_eq!(a.with(|p| p.0), 2);
    }
}
