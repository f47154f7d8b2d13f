// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Per-thread execution context: TID, sink, lock-ownership stack, implicit
//! arguments, and the currently-executing-object ("self") stack.
//!
//! A [`ThreadContext`] lives entirely on the thread it belongs to — it is
//! reached through thread-local storage, never shared across threads — so
//! its interior-mutable fields are plain [`RefCell`]s rather than anything
//! lock-based.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use tracing::debug;

use vellum_sync::{ThreadId as Tid, VLock};
use vellum_value::{QObject, Sink, Value, WeakRef};

use crate::resource::ResourceRegistry;

static NEXT_TID: AtomicI64 = AtomicI64::new(1);

/// The process-wide default handler's own sink (spec §4.3: "these exceptions
/// are reported via the thread's default handler, not the current sink,
/// [since] the sink is being torn down").
fn default_handler_sink() -> &'static StdMutex<Sink> {
    static HANDLER: OnceLock<StdMutex<Sink>> = OnceLock::new();
    HANDLER.get_or_init(|| StdMutex::new(Sink::new()))
}

/// Routes a cleanup sink's pending exception/thread-exit flag through the
/// default handler rather than the thread's own (already-torn-down) sink,
/// via [`Sink::assimilate`]. Unhandled-exception formatting in a host
/// embedding belongs one layer up (`vellum-runtime`'s `ExceptionReport`); this
/// crate only guarantees the exception reaches *a* handler instead of being
/// silently dropped, mirrored to `tracing` in the meantime.
fn report_to_default_handler(tid: Tid, cleanup_sink: Sink) {
    if !cleanup_sink.is_event() {
        return;
    }
    let mut handler = default_handler_sink().lock().expect("default handler sink poisoned");
    handler.assimilate(cleanup_sink);
    if let Some(exc) = handler.take() {
        tracing::warn!(
            tid,
            code = exc.error_code().unwrap_or("USER-EXCEPTION"),
            description = %exc.description(),
            "resource forcibly released on thread exit; reported via the default handler"
        );
    }
}

/// Everything a running thread needs to evaluate language code: its TID,
/// exception sink, lock-ownership vlock, resource-cleanup registry, implicit
/// argument stack (`$1`/`$2`/...), and the stack of objects currently
/// executing a method (the "self" stack, innermost last).
pub struct ThreadContext {
    tid: Tid,
    vlock: Arc<VLock>,
    sink: RefCell<Sink>,
    resources: ResourceRegistry,
    self_stack: RefCell<Vec<WeakRef<QObject>>>,
    implicit_args: RefCell<Vec<Value>>,
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("tid", &self.tid)
            .field("self_depth", &self.self_stack.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ThreadContext {
    #[must_use]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[must_use]
    pub fn vlock(&self) -> &Arc<VLock> {
        &self.vlock
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Runs `f` against this thread's sink. Every evaluator entry point
    /// reaches the sink this way rather than threading a `&mut Sink`
    /// parameter through every call, since the sink is thread-local state.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut Sink) -> R) -> R {
        f(&mut self.sink.borrow_mut())
    }

    /// Borrows this thread's sink directly, for callers (the evaluator) that
    /// need to hold it across several statements rather than one closure
    /// call. Panics if already mutably borrowed, matching `RefCell`'s usual
    /// single-writer rule.
    #[must_use]
    pub fn sink(&self) -> std::cell::RefMut<'_, Sink> {
        self.sink.borrow_mut()
    }

    /// Pushes `receiver` onto the self stack on entry to one of its methods.
    pub fn push_self(&self, receiver: WeakRef<QObject>) {
        self.self_stack.borrow_mut().push(receiver);
    }

    /// Pops the innermost self-stack entry on method exit.
    pub fn pop_self(&self) -> Option<WeakRef<QObject>> {
        self.self_stack.borrow_mut().pop()
    }

    /// The object `self` currently refers to, if any method call is active.
    #[must_use]
    pub fn current_self(&self) -> Option<WeakRef<QObject>> {
        self.self_stack.borrow().last().cloned()
    }

    /// Replaces the implicit-argument stack (`$1`, `$2`, ...) for the call
    /// about to run.
    pub fn set_implicit_args(&self, args: Vec<Value>) {
        *self.implicit_args.borrow_mut() = args;
    }

    #[must_use]
    pub fn implicit_args(&self) -> Vec<Value> {
        self.implicit_args.borrow().clone()
    }

    #[must_use]
    pub fn implicit_arg(&self, index: usize) -> Value {
        self.implicit_args
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Nothing)
    }
}

struct Slot {
    depth: Cell<u32>,
    context: Rc<ThreadContext>,
}

thread_local! {
    static CURRENT: RefCell<Option<Slot>> = const { RefCell::new(None) };
}

/// An RAII registration for the calling OS thread, returned by
/// [`ThreadContext::attach`]. Nested `attach` calls on the same thread share
/// one underlying [`ThreadContext`]: only the outermost handle's drop
/// actually unregisters the thread and runs its resource cleanup, so a host
/// callback that re-enters the runtime doesn't tear down the thread's
/// in-flight state.
///
/// Deliberately `!Send`/`!Sync` (via the `Rc` it indirectly holds) — a
/// thread context can only ever be attached/detached by the thread it
/// belongs to.
#[derive(Debug)]
pub struct ThreadHandle {
    _not_send_sync: Rc<()>,
}

impl ThreadHandle {
    /// The context for the thread this handle was attached on.
    #[must_use]
    pub fn context(&self) -> Rc<ThreadContext> {
        CURRENT.with(|slot| {
            slot.borrow()
                .as_ref()
                .expect("thread handle outlived its thread-local slot")
                .context
                .clone()
        })
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        CURRENT.with(|slot| {
            let remaining = {
                let borrowed = slot.borrow();
                let current = borrowed
                    .as_ref()
                    .expect("thread handle dropped after its context was torn down");
                current.depth.set(current.depth.get() - 1);
                current.depth.get()
            };
            if remaining > 0 {
                return;
            }
            let detached = slot.borrow_mut().take().expect("slot already empty");
            let tid = detached.context.tid;
            // Cleanup runs against a fresh sink, not the thread's own (which
            // is being torn down right now) — its exceptions are routed to
            // the default handler instead.
            let mut cleanup_sink = Sink::new();
            detached.context.resources.cleanup_all(&mut cleanup_sink);
            report_to_default_handler(tid, cleanup_sink);
            vellum_sync::unregister_thread(tid);
            debug!(tid, "thread detached");
        });
    }
}

impl ThreadContext {
    /// Registers the calling OS thread with the deadlock detector and
    /// allocates its [`ThreadContext`], returning a guard that unregisters it
    /// when the outermost attachment drops.
    #[must_use]
    pub fn attach() -> ThreadHandle {
        CURRENT.with(|slot| {
            let mut borrowed = slot.borrow_mut();
            match borrowed.as_ref() {
                Some(existing) => {
                    existing.depth.set(existing.depth.get() + 1);
                }
                None => {
                    let tid = NEXT_TID.fetch_add(1, Ordering::Relaxed);
                    let vlock = vellum_sync::register_thread(tid);
                    let context = Rc::new(ThreadContext {
                        tid,
                        vlock,
                        sink: RefCell::new(Sink::new()),
                        resources: ResourceRegistry::new(),
                        self_stack: RefCell::new(Vec::new()),
                        implicit_args: RefCell::new(Vec::new()),
                    });
                    debug!(tid, "thread attached");
                    *borrowed = Some(Slot {
                        depth: Cell::new(1),
                        context,
                    });
                }
            }
        });
        ThreadHandle {
            _not_send_sync: Rc::new(()),
        }
    }
}

/// The calling thread's context, or `None` if it has never called
/// [`ThreadContext::attach`].
#[must_use]
pub fn current() -> Option<Rc<ThreadContext>> {
    CURRENT.with(|slot| slot.borrow().as_ref().map(|s| s.context.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_allocates_distinct_tids_per_detach_reattach() {
        let handle = ThreadContext::attach();
        let first_tid = handle.context().tid();
        drop(handle);
        let handle = ThreadContext::attach();
        let second_tid = handle.context().tid();
        assert_ne!(first_tid, second_tid);
    }

    #[test]
    fn test_nested_attach_shares_one_context() {
        let outer = ThreadContext::attach();
        let outer_tid = outer.context().tid();
        let inner = ThreadContext::attach();
        assert_eq!(inner.context().tid(), outer_tid);
        drop(inner);
        // Context should still be alive: the outer handle hasn't dropped.
        assert_eq!(current().unwrap().tid(), outer_tid);
        drop(outer);
        assert!(current().is_none());
    }

    #[test]
    fn test_detach_routes_cleanup_exception_to_default_handler_not_live_sink() {
        use crate::resource::ThreadResource;
        use vellum_exceptions::ErrorKind;

        #[derive(Debug)]
        struct AlwaysFails;
        impl ThreadResource for AlwaysFails {
            fn cleanup(&self, sink: &mut Sink) {
                sink.raise_system(ErrorKind::LockError, "forced release on thread exit");
            }
        }

        let handle = ThreadContext::attach();
        handle.context().resources().register(1, Arc::new(AlwaysFails));
        // The thread's own sink must stay clean: cleanup runs against a
        // fresh sink, not this one.
        assert!(!handle.context().sink().is_event());
        drop(handle);

        let mut default_sink = default_handler_sink().lock().unwrap();
        let exc = default_sink.take().expect("cleanup exception routed to default handler");
        assert_eq!(exc.error_code(), Some("LOCK-ERROR"));
    }

    #[test]
    fn test_implicit_args_round_trip() {
        let handle = ThreadContext::attach();
        handle
            .context()
            .set_implicit_args(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(handle.context().implicit_arg(0), Value::Int(1)));
        assert!(matches!(handle.context().implicit_arg(5), Value::Nothing));
    }

    #[test]
    fn test_self_stack_push_pop() {
        let handle = ThreadContext::attach();
        let obj = vellum_value::StrongRef::new(QObject::new("Widget"));
        handle.context().push_self(obj.downgrade());
        assert!(handle.context().current_self().is_some());
        handle.context().pop_self();
        assert!(handle.context().current_self().is_none());
    }
}
