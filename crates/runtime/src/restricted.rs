// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Structural enforcement of [`ParseOptions`] bits that map onto a concrete
//! `Node` shape.
//!
//! The lexer/parser that turns source text into `Node` trees is an excluded
//! collaborator (see the containing workspace's scope note), so this crate
//! never sees raw syntax — only the AST a host's parser already built. Bits
//! naming a restriction this AST can express directly (`new`, `background`,
//! the external-process operator) are enforced here by walking the tree once
//! before registering it. Bits naming a concept this core's data model has
//! no representation for at all (namespaces, constants as a distinct
//! declaration kind, the "our" storage class, and the system-class
//! catalogue for sockets/files/databases/GUIs/terminals) are carried
//! faithfully in the bit set for a host's class loader to consult, but this
//! crate has no AST shape to check them against — see `DESIGN.md`.

use vellum_eval::context::ContextQuery;
use vellum_eval::Node;

use crate::parse_options::ParseOptions;

/// Returns the first restricted construct found in `node`, as
/// `(violated_option_name, description)`.
#[must_use]
pub fn scan(node: &Node, options: ParseOptions) -> Option<(&'static str, String)> {
    let mut found = None;
    walk(node, &mut |n| {
        if found.is_some() {
            return;
        }
        found = check_one(n, options);
    });
    found
}

fn check_one(node: &Node, options: ParseOptions) -> Option<(&'static str, String)> {
    match node {
        Node::New { class_name, .. } if options.contains(ParseOptions::NO_NEW) => {
            Some(("no-new", format!("object instantiation of '{class_name}' is forbidden")))
        }
        Node::Background(_) if options.contains(ParseOptions::NO_THREAD_CONTROL) => {
            Some(("no-thread-control", "the background operator is forbidden".to_string()))
        }
        #[cfg(feature = "external-process")]
        Node::Backquote(_) if options.contains(ParseOptions::NO_EXTERNAL_PROCESS) => {
            Some(("no-external-process", "the backquote operator is forbidden".to_string()))
        }
        _ => None,
    }
}

/// Visits `node` and every descendant reachable through it, depth-first.
fn walk(node: &Node, visit: &mut impl FnMut(&Node)) {
    visit(node);
    for child in children(node) {
        walk(child, visit);
    }
}

/// The direct child `Node`s of a single node, for `walk`'s traversal. Leaf
/// nodes (literals, `Local`, `SelfRef`, `ImplicitArg`, `Break`, `Continue`,
/// `ThreadExit`, `Rethrow`) simply return nothing.
fn children(node: &Node) -> Vec<&Node> {
    match node {
        Node::Literal(_)
        | Node::Local(_)
        | Node::SelfRef
        | Node::ImplicitArg(_)
        | Node::Break
        | Node::Continue
        | Node::Rethrow
        | Node::ThreadExit => vec![],

        Node::ListLit(items) => items.iter().collect(),
        Node::HashLit(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),

        Node::Declare { init, .. } => init.iter().map(|b| b.as_ref()).collect(),

        Node::Member { receiver, .. } => vec![receiver.as_ref()],
        Node::Index { base, index } => vec![base.as_ref(), index.as_ref()],
        Node::RangeIndex { base, start, end } => vec![base.as_ref(), start.as_ref(), end.as_ref()],

        Node::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        Node::Unary { operand, .. } => vec![operand.as_ref()],
        Node::And(a, b) | Node::Or(a, b) | Node::Coalesce(a, b) => vec![a.as_ref(), b.as_ref()],
        Node::Ternary { cond, then_branch, else_branch } => {
            vec![cond.as_ref(), then_branch.as_ref(), else_branch.as_ref()]
        }

        Node::Assign { target, rhs, .. } => vec![target.as_ref(), rhs.as_ref()],
        Node::ListAssign { targets, rhs } => targets.iter().chain(std::iter::once(rhs.as_ref())).collect(),

        Node::Extract { target, offset, len, replacement } | Node::Splice { target, offset, len, replacement } => {
            let mut kids = vec![target.as_ref(), offset.as_ref(), len.as_ref()];
            if let Some(r) = replacement {
                kids.push(r.as_ref());
            }
            kids
        }

        Node::Reference(inner) | Node::Deref(inner) => vec![inner.as_ref()],

        Node::Map { iterable, body, .. } | Node::Select { iterable, predicate: body, .. } => {
            vec![iterable.as_ref(), body.as_ref()]
        }
        Node::FoldL { iterable, init, body, .. } | Node::FoldR { iterable, init, body, .. } => {
            vec![iterable.as_ref(), init.as_ref(), body.as_ref()]
        }
        Node::Keys(inner) => vec![inner.as_ref()],

        Node::Seq(items) => items.iter().collect(),
        Node::If { cond, then_branch, else_branch } => {
            let mut kids = vec![cond.as_ref(), then_branch.as_ref()];
            if let Some(e) = else_branch {
                kids.push(e.as_ref());
            }
            kids
        }
        Node::While { cond, body } => vec![cond.as_ref(), body.as_ref()],
        Node::Return(inner) => inner.iter().map(|b| b.as_ref()).collect(),
        Node::Try { body, catch_body, .. } => vec![body.as_ref(), catch_body.as_ref()],
        Node::Throw(inner) => vec![inner.as_ref()],

        Node::FunctionCall { args, .. } => args.iter().collect(),
        Node::MethodCall { receiver, args, .. } => std::iter::once(receiver.as_ref()).chain(args.iter()).collect(),
        Node::New { args, .. } => args.iter().collect(),
        Node::Invoke { callee, args } => std::iter::once(callee.as_ref()).chain(args.iter()).collect(),
        Node::Closure { body, .. } => vec![body.as_ref()],
        Node::Background(body) => vec![body.as_ref()],

        #[cfg(feature = "external-process")]
        Node::Backquote(inner) => vec![inner.as_ref()],

        Node::RegexMatch { subject, pattern, .. } => vec![subject.as_ref(), pattern.as_ref()],
        Node::RegexSubstitute { subject, pattern, replacement } => {
            vec![subject.as_ref(), pattern.as_ref(), replacement.as_ref()]
        }
        Node::Transliterate { subject, from, to } => vec![subject.as_ref(), from.as_ref(), to.as_ref()],

        Node::ContextQuery(query) => context_query_children(query),
    }
}

fn context_query_children(query: &ContextQuery) -> Vec<&Node> {
    match query {
        ContextQuery::Find(q) => vec![q.source.as_ref(), q.predicate.as_ref()],
        ContextQuery::Iterate(q) => {
            let mut kids = vec![q.source.as_ref()];
            if let Some(p) = &q.predicate {
                kids.push(p.as_ref());
            }
            if let Some((key, _)) = &q.sort_key {
                kids.push(key.as_ref());
            }
            kids.push(q.body.as_ref());
            kids
        }
        ContextQuery::Summarize(q) => vec![q.source.as_ref(), q.key.as_ref(), q.body.as_ref()],
    }
}

#[cfg(test)]
mod tests {
    use vellum_value::Value;

    use super::*;

    #[test]
    fn test_scan_flags_new_under_no_new() {
        let node = Node::New { class_name: "Socket".to_string(), args: vec![] };
        let found = scan(&node, ParseOptions::NO_NEW);
        assert_eq!(found.unwrap().0, "no-new");
    }

    #[test]
    fn test_scan_allows_new_without_restriction() {
        let node = Node::New { class_name: "Socket".to_string(), args: vec![] };
        assert!(scan(&node, ParseOptions::empty()).is_none());
    }

    #[test]
    fn test_scan_finds_restricted_construct_nested_in_seq() {
        let inner = Node::Background(std::sync::Arc::new(Node::Literal(Value::Int(1))));
        let node = Node::Seq(vec![Node::Literal(Value::Nothing), inner]);
        let found = scan(&node, ParseOptions::NO_THREAD_CONTROL);
        assert_eq!(found.unwrap().0, "no-thread-control");
    }
}
