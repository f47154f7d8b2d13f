// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The tree-walking evaluator: one AST sum type dispatched through a single
//! `eval` method (per the redesign guidance away from virtual dispatch),
//! the operator semantics it delegates to, and the `context`/`find`/
//! `summarize`/`sort` declarative sublanguage.
//!
//! Everything here assumes an AST already exists — building one from
//! source text is the excluded parser's job (see the crate's containing
//! workspace-level scope note). [`Node::parse_init`] still performs the
//! two-phase lifetime's parse-time work that doesn't require lexing: scope
//! bookkeeping, constant folding, background/rethrow flag enforcement, and
//! recording declared types for the lvalue engine to enforce later.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod ast;
pub mod context;
mod frame;
mod operators;
mod parse_context;
mod program;
mod unwind;

pub use crate::ast::Node;
pub use crate::frame::{Frame, Lvid};
pub use crate::operators::{truthy, AssignOp, BinOp, UnaryOp};
pub use crate::parse_context::{ParseContext, ParseFlags, Scope, TypeInfo};
pub use crate::program::{call_function, construct_object, ClassDef, FunctionDef, Program};
pub use crate::unwind::Unwind;

use std::sync::Arc;

use vellum_threads::ThreadContext;

/// Everything a node's `eval` needs to run: its activation's local-variable
/// frame, the executing thread's context (sink, self stack, implicit
/// arguments, vlock — all reached through `ThreadContext`'s interior
/// mutability rather than a `&mut` parameter), and the program-wide
/// function/class tables a call/method-call/`new` dispatches against.
///
/// `Copy` because every nested `eval` call just needs its own shallow copy
/// of these three references, the same way `ParseContext::reborrow` hands
/// out a fresh view rather than threading `&mut` through the whole tree.
#[derive(Debug, Clone, Copy)]
pub struct EvalCtx<'a> {
    pub frame: &'a Frame,
    pub thread: &'a ThreadContext,
    pub program: &'a Arc<Program>,
}

impl<'a> EvalCtx<'a> {
    #[must_use]
    pub fn new(frame: &'a Frame, thread: &'a ThreadContext, program: &'a Arc<Program>) -> Self {
        Self { frame, thread, program }
    }

    /// True if the thread's sink currently holds a pending exception or a
    /// `thread-exit` request — the "stop and propagate" check every
    /// multi-statement node runs after evaluating a sub-expression.
    #[must_use]
    pub fn has_event(&self) -> bool {
        self.thread.sink().is_event()
    }
}
