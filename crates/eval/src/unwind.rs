// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Control-flow unwinding modeled as a tagged return value rather than a
//! host exception, keeping `return`/`break`/`continue`/`thread-exit` out of
//! Rust's own unwind machinery.

use vellum_value::Value;

/// What an `eval` call produced: an ordinary value, or a request to unwind
/// the enclosing control structure(s).
///
/// `rethrow`/`throw` aren't represented here — a thrown exception is raised
/// on the thread's [`vellum_value::Sink`] directly (following the exception
/// channel's contract in `vellum-exceptions`) and every `eval` caller is
/// expected to check `sink.is_event()` after a sub-evaluation before
/// inspecting the returned [`Unwind`], the same "check the sink first" rule
/// the data model's coercions follow.
#[derive(Debug, Clone)]
pub enum Unwind {
    /// Ordinary completion with a value.
    Normal(Value),
    /// `return EXPR` (or bare `return`, carrying `Value::Nothing`).
    Return(Value),
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `thread-exit`.
    ThreadExit,
}

impl Unwind {
    /// The value carried by `Normal`/`Return`, or `Value::Nothing` for a
    /// control-flow-only variant. Used by callers that only care about "what
    /// would this expression's value have been" (e.g. the left side of `&&`).
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Unwind::Normal(v) | Unwind::Return(v) => v,
            Unwind::Break | Unwind::Continue | Unwind::ThreadExit => Value::Nothing,
        }
    }

    /// True for any variant other than `Normal` — the signal that a caller
    /// evaluating a sequence of sub-expressions must stop and propagate
    /// rather than continue to the next one.
    #[must_use]
    pub fn is_unwinding(&self) -> bool {
        !matches!(self, Unwind::Normal(_))
    }
}
