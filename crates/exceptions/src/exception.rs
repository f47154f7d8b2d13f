// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A single chained exception, plus the call-stack frame it carries.

use crate::error_kind::ErrorKind;

/// Whether an exception was raised by the runtime or by user `throw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Raised by the runtime itself; carries a stable [`ErrorKind`].
    System(ErrorKind),
    /// Raised by a `throw` statement with an arbitrary language value.
    User,
}

/// A single frame of a call-stack snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// The function or method name active at this frame.
    pub function: String,
    /// The source file, if known.
    pub file: Option<String>,
    /// The 1-based source line, if known.
    pub line: u32,
}

impl CallFrame {
    /// Creates a new call frame.
    #[must_use]
    pub fn new(function: impl Into<String>, file: Option<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file,
            line,
        }
    }
}

/// A structured, chainable exception.
///
/// `A` is the type of the `arg` a user exception (`throw <value>`) carries.
/// System exceptions never populate `arg`.
#[derive(Debug, Clone)]
pub struct Exception<A> {
    kind: ExceptionKind,
    description: String,
    arg: Option<A>,
    call_stack: Vec<CallFrame>,
    source_location: Option<CallFrame>,
    next: Option<Box<Exception<A>>>,
}

impl<A> Exception<A> {
    /// Constructs a system exception with the given [`ErrorKind`] and description.
    #[must_use]
    pub fn system(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::System(kind),
            description: description.into(),
            arg: None,
            call_stack: Vec::new(),
            source_location: None,
            next: None,
        }
    }

    /// Constructs a user exception (`throw`) carrying `arg`.
    #[must_use]
    pub fn user(arg: A, description: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::User,
            description: description.into(),
            arg: Some(arg),
            call_stack: Vec::new(),
            source_location: None,
            next: None,
        }
    }

    /// Returns the exception kind.
    #[must_use]
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// Returns the stable error code for a system exception, or `None` for a user exception.
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match self.kind {
            ExceptionKind::System(k) => Some(k.code()),
            ExceptionKind::User => None,
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the user-supplied argument, if any.
    #[must_use]
    pub fn arg(&self) -> Option<&A> {
        self.arg.as_ref()
    }

    /// Returns the call-stack snapshot, outermost frame first.
    #[must_use]
    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    /// Returns the originating source location, if recorded.
    #[must_use]
    pub fn source_location(&self) -> Option<&CallFrame> {
        self.source_location.as_ref()
    }

    /// Records the originating source location.
    pub fn with_source_location(mut self, frame: CallFrame) -> Self {
        self.source_location = Some(frame);
        self
    }

    /// Appends a frame to the call-stack snapshot.
    pub fn push_frame(&mut self, frame: CallFrame) {
        self.call_stack.push(frame);
    }

    /// Returns the next exception in the chain, if this is a rethrow of an earlier one.
    #[must_use]
    pub fn next(&self) -> Option<&Exception<A>> {
        self.next.as_deref()
    }

    /// The total length of the chain starting at `self` (1 for a standalone exception).
    #[must_use]
    pub fn chain_len(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |n| n.chain_len())
    }

    /// Produces a new exception that rethrows `self`: the original exception
    /// becomes `next`, and `frame` is appended to the new exception's call
    /// stack, so the outer catch observes a call stack strictly longer than
    /// the inner one (see the exception-chaining testable property).
    #[must_use]
    pub fn rethrow(self, frame: CallFrame) -> Self
    where
        A: Clone,
    {
        let mut call_stack = self.call_stack.clone();
        call_stack.push(frame);
        Self {
            kind: self.kind,
            description: self.description.clone(),
            arg: self.arg.clone(),
            call_stack,
            source_location: self.source_location.clone(),
            next: Some(Box::new(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_exception_code() {
        let exc = Exception::<()>::system(ErrorKind::LockError, "release without hold");
        assert_eq!(exc.error_code(), Some("LOCK-ERROR"));
        assert_eq!(exc.chain_len(), 1);
    }

    #[test]
    fn test_user_exception_carries_arg() {
        let exc = Exception::user(42i64, "custom failure");
        assert_eq!(exc.arg(), Some(&42));
        assert!(exc.error_code().is_none());
    }

    #[test]
    fn test_rethrow_grows_call_stack_and_chain() {
        let inner = Exception::<()>::system(ErrorKind::DivisionByZero, "div by zero")
            .with_source_location(CallFrame::new("inner", Some("a.vl".into()), 10));
        let frame = CallFrame::new("outer", Some("a.vl".into()), 20);
        let outer = inner.clone().rethrow(frame);

        assert_eq!(outer.chain_len(), 2);
        assert!(outer.call_stack().len() > inner.call_stack().len());
        assert_eq!(outer.next().unwrap().description(), "div by zero");
    }
}
