// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The stable system error-code taxonomy the runtime raises.

/// A system-raised error code, carrying the exact ASCII identifier the
/// language exposes to `try`/`catch` blocks (e.g. `"LOCK-ERROR"`).
///
/// `#[non_exhaustive]` because the stdlib classes outside the core (sockets,
/// SQL, XML, ...) each define their own additional codes; the core only
/// commits to the rows documented here.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Release without hold, release by the wrong TID, or an operation on a deleted lock.
    #[error("LOCK-ERROR")]
    LockError,
    /// The deadlock detector found a cycle during an acquire.
    #[error("THREAD-DEADLOCK")]
    ThreadDeadlock,
    /// Member access or method call on an object whose strong count reached zero.
    #[error("OBJECT-ALREADY-DELETED")]
    ObjectAlreadyDeleted,
    /// Assignment violates a declared type.
    #[error("RUNTIME-TYPE-ERROR")]
    RuntimeTypeError,
    /// Integer `/` or `%` with a zero divisor.
    #[error("DIVISION-BY-ZERO")]
    DivisionByZero,
    /// A regex pattern failed to compile.
    #[error("REGEX-COMPILATION-ERROR")]
    RegexCompilationError,
    /// An unknown option bit was passed to a regex constructor.
    #[error("REGEX-OPTION-ERROR")]
    RegexOptionError,
    /// Subprocess invocation for a backquote expression failed.
    #[error("BACKQUOTE-ERROR")]
    BackquoteError,
    /// `dec` below zero, or an operation on a deleted counter.
    #[error("COUNTER-ERROR")]
    CounterError,
    /// An operation on a deleted queue.
    #[error("QUEUE-ERROR")]
    QueueError,
    /// A wait on a lock the caller does not own.
    #[error("WAIT-ERROR")]
    WaitError,
    /// A parse-time type problem.
    #[error("PARSE-TYPE-ERROR")]
    ParseTypeError,
    /// A parse-time usage problem (also emitted as a warning).
    #[error("INVALID-OPERATION")]
    InvalidOperation,
}

impl ErrorKind {
    /// Returns the exact ASCII identifier string a catch block would see.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::LockError => "LOCK-ERROR",
            Self::ThreadDeadlock => "THREAD-DEADLOCK",
            Self::ObjectAlreadyDeleted => "OBJECT-ALREADY-DELETED",
            Self::RuntimeTypeError => "RUNTIME-TYPE-ERROR",
            Self::DivisionByZero => "DIVISION-BY-ZERO",
            Self::RegexCompilationError => "REGEX-COMPILATION-ERROR",
            Self::RegexOptionError => "REGEX-OPTION-ERROR",
            Self::BackquoteError => "BACKQUOTE-ERROR",
            Self::CounterError => "COUNTER-ERROR",
            Self::QueueError => "QUEUE-ERROR",
            Self::WaitError => "WAIT-ERROR",
            Self::ParseTypeError => "PARSE-TYPE-ERROR",
            Self::InvalidOperation => "INVALID-OPERATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_display() {
        assert_eq!(ErrorKind::LockError.code(), ErrorKind::LockError.to_string());
        assert_eq!(
            ErrorKind::ThreadDeadlock.code(),
            ErrorKind::ThreadDeadlock.to_string()
        );
    }
}
