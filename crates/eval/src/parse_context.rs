// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! `parse_init`'s companion state: the lexical scope a name resolves
//! against, the contextual flags that change how a node parses, the lvid
//! counter, and the per-lvid declared-type table `vellum-lvalue` needs for
//! assignment enforcement.

use std::collections::HashMap;

use vellum_lvalue::DeclaredType;

use crate::frame::Lvid;

/// Flags threaded through `parse_init`, set by an enclosing construct and
/// read by the node currently parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseFlags {
    /// The statement's result is discarded; permits rewriting `x++` to the
    /// cheaper `++x`.
    pub return_value_ignored: bool,
    /// Inside a `background` argument: local-variable references must be
    /// `&`-references, not plain reads.
    pub background: bool,
    /// This node must parse into an lvalue-shaped target.
    pub for_assignment: bool,
    /// Inside a constant initializer: side-effecting forms are rejected.
    pub const_expression: bool,
    /// `rethrow` is valid here (inside a `catch` block).
    pub rethrow_ok: bool,
    /// This is the outermost node of a program (as opposed to nested inside
    /// a closure body).
    pub top_level: bool,
}

#[derive(Debug, Default)]
struct ScopeBlock {
    names: HashMap<String, Lvid>,
}

/// A chain of nested block scopes, innermost last. Declaring a name shadows
/// any same-named binding in an outer block; resolution searches innermost
/// to outermost.
#[derive(Debug)]
pub struct Scope {
    blocks: Vec<ScopeBlock>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![ScopeBlock::default()],
        }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(ScopeBlock::default());
    }

    pub fn pop_block(&mut self) {
        self.blocks.pop();
        debug_assert!(!self.blocks.is_empty(), "popped the outermost scope block");
    }

    pub fn declare(&mut self, name: impl Into<String>, lvid: Lvid) {
        self.blocks
            .last_mut()
            .expect("scope always has at least one block")
            .names
            .insert(name.into(), lvid);
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Lvid> {
        self.blocks.iter().rev().find_map(|b| b.names.get(name).copied())
    }
}

/// Accumulates the declared type recorded for each lvid as `my TYPE NAME`
/// declarations are parsed, so a later `Assign` targeting that lvid can look
/// up the constraint `vellum-lvalue` should enforce.
#[derive(Debug, Default)]
pub struct TypeInfo {
    declared: HashMap<Lvid, DeclaredType>,
}

impl TypeInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, lvid: Lvid, declared_type: DeclaredType) {
        self.declared.insert(lvid, declared_type);
    }

    #[must_use]
    pub fn get(&self, lvid: Lvid) -> DeclaredType {
        self.declared.get(&lvid).cloned().unwrap_or(DeclaredType::Any)
    }
}

/// Everything `parse_init` threads through the tree: the lexical scope,
/// the contextual flags, the running lvid counter (shared across the whole
/// activation being parsed — a program or one closure body), and the
/// declared-type table.
pub struct ParseContext<'a> {
    pub scope: &'a mut Scope,
    pub flags: ParseFlags,
    pub lvid_count: &'a mut usize,
    pub type_info: &'a mut TypeInfo,
}

impl<'a> ParseContext<'a> {
    /// Declares a new local, returning the lvid it was assigned.
    pub fn declare_local(&mut self, name: &str, declared_type: DeclaredType) -> Lvid {
        let lvid = *self.lvid_count;
        *self.lvid_count += 1;
        self.scope.declare(name, lvid);
        self.type_info.record(lvid, declared_type);
        lvid
    }

    /// Reborrows this context with different flags for parsing a
    /// sub-expression (e.g. clearing `for_assignment` once the lvalue target
    /// itself has been consumed).
    pub fn with_flags(&mut self, flags: ParseFlags) -> ParseContext<'_> {
        ParseContext {
            scope: self.scope,
            flags,
            lvid_count: self.lvid_count,
            type_info: self.type_info,
        }
    }

    /// Reborrows this context unchanged, for recursing into a sub-expression
    /// that doesn't change the flag set.
    pub fn reborrow(&mut self) -> ParseContext<'_> {
        let flags = self.flags;
        self.with_flags(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing_prefers_innermost_block() {
        let mut scope = Scope::new();
        scope.declare("x", 0);
        scope.push_block();
        scope.declare("x", 1);
        assert_eq!(scope.resolve("x"), Some(1));
        scope.pop_block();
        assert_eq!(scope.resolve("x"), Some(0));
    }

    #[test]
    fn test_type_info_defaults_to_any() {
        let info = TypeInfo::new();
        assert_eq!(info.get(42), DeclaredType::Any);
    }

    #[test]
    fn test_declare_local_increments_counter_and_records_type() {
        let mut scope = Scope::new();
        let mut count = 0usize;
        let mut type_info = TypeInfo::new();
        let mut ctx = ParseContext {
            scope: &mut scope,
            flags: ParseFlags::default(),
            lvid_count: &mut count,
            type_info: &mut type_info,
        };
        let lvid = ctx.declare_local("x", DeclaredType::Int);
        assert_eq!(lvid, 0);
        assert_eq!(count, 1);
        assert_eq!(type_info.get(0), DeclaredType::Int);
    }
}
