// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The per-thread exception sink.

use crate::{error_kind::ErrorKind, exception::Exception};

/// Per-thread exception channel.
///
/// Every evaluator entry point takes a `&mut Sink<A>` as an out-parameter.
/// After any sub-evaluation, the caller must check [`Sink::is_event`] before
/// using the result; by convention the result is `nothing`/default when the
/// sink is in the error state.
#[derive(Debug, Default)]
pub struct Sink<A> {
    head: Option<Exception<A>>,
    thread_exit_requested: bool,
}

impl<A> Sink<A> {
    /// Creates a new, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: None,
            thread_exit_requested: false,
        }
    }

    /// Returns `true` if an exception is currently pending.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.head.is_some()
    }

    /// Returns `true` if `thread-exit` has been requested on this sink.
    #[must_use]
    pub fn is_thread_exit(&self) -> bool {
        self.thread_exit_requested
    }

    /// Returns `true` if there is a pending exception or a thread-exit request
    /// (the unified "is there something the caller must stop and handle" check).
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.is_exception() || self.is_thread_exit()
    }

    /// Returns the pending exception without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<&Exception<A>> {
        self.head.as_ref()
    }

    /// Raises a system exception, replacing any exception that is already pending.
    ///
    /// Qore's runtime only ever has one exception pending per sink at a time;
    /// a second `raiseException` call while one is already pending overwrites
    /// it, matching the original's `insert` behavior for non-rethrow raises.
    pub fn raise_system(&mut self, kind: ErrorKind, description: impl Into<String>) {
        let description = description.into();
        tracing::debug!(code = kind.code(), %description, "exception raised");
        self.head = Some(Exception::system(kind, description));
    }

    /// Raises a user exception (`throw`) carrying `arg`.
    pub fn raise_user(&mut self, arg: A, description: impl Into<String>) {
        let description = description.into();
        tracing::debug!(%description, "user exception thrown");
        self.head = Some(Exception::user(arg, description));
    }

    /// Raises an already-constructed exception, e.g. one produced by
    /// [`Exception::rethrow`].
    pub fn raise(&mut self, exception: Exception<A>) {
        self.head = Some(exception);
    }

    /// Sets the thread-exit flag. `thread-exit` unwinds like an exception but
    /// is not catchable by `try`, so it is tracked independently of `head`.
    pub fn raise_thread_exit(&mut self) {
        self.thread_exit_requested = true;
    }

    /// Removes and returns the pending exception, for use by a `catch` block.
    pub fn take(&mut self) -> Option<Exception<A>> {
        self.head.take()
    }

    /// Clears any pending exception and the thread-exit flag.
    pub fn clear(&mut self) {
        self.head = None;
        self.thread_exit_requested = false;
    }

    /// Merges another sink's pending exception into this one.
    ///
    /// Used when thread-resource cleanup (run on a torn-down sink) must
    /// report its own exceptions through the thread's default handler
    /// rather than the sink being torn down.
    pub fn assimilate(&mut self, mut other: Sink<A>) {
        if let Some(exc) = other.take() {
            self.head = Some(exc);
        }
        self.thread_exit_requested |= other.thread_exit_requested;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sink_has_no_event() {
        let sink: Sink<()> = Sink::new();
        assert!(!sink.is_event());
    }

    #[test]
    fn test_raise_system_sets_event() {
        let mut sink: Sink<()> = Sink::new();
        sink.raise_system(ErrorKind::LockError, "bad release");
        assert!(sink.is_exception());
        assert!(sink.is_event());
        assert_eq!(sink.peek().unwrap().error_code(), Some("LOCK-ERROR"));
    }

    #[test]
    fn test_take_clears_pending_exception() {
        let mut sink: Sink<()> = Sink::new();
        sink.raise_system(ErrorKind::WaitError, "not owner");
        let exc = sink.take();
        assert!(exc.is_some());
        assert!(!sink.is_exception());
    }

    #[test]
    fn test_thread_exit_is_independent_of_exception() {
        let mut sink: Sink<()> = Sink::new();
        sink.raise_thread_exit();
        assert!(sink.is_thread_exit());
        assert!(!sink.is_exception());
        assert!(sink.is_event());
    }

    #[test]
    fn test_assimilate_merges_pending_exception() {
        let mut sink: Sink<()> = Sink::new();
        let mut other: Sink<()> = Sink::new();
        other.raise_system(ErrorKind::QueueError, "deleted queue");
        sink.assimilate(other);
        assert!(sink.is_exception());
    }
}
