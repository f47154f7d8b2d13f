// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The AST sum type and its two-phase lifetime.
//!
//! `Node` is built already lvid-indexed (assigning a textual name to a
//! local variable slot is the excluded parser's job); what [`Node::parse_init`]
//! still does here is the rest of the contract that doesn't require lexing:
//! pushing/popping lexical scope blocks as `Seq` nodes are walked, recording
//! each `Declare`'s type into the shared [`TypeInfo`] table so a later
//! `Assign` targeting the same local can look up its constraint, folding
//! literal arithmetic, and enforcing the `background`/`rethrow_ok` flag
//! rules. `eval` is the single dispatch point every node goes through.

use std::sync::Arc;

use anyhow::{bail, Context as _};
use vellum_exceptions::{CallFrame, ErrorKind};
use vellum_lvalue::{acquire, DeclaredType, LvalueTarget};
use vellum_value::{Coerce, QHash, QReference, ReferenceTarget, Sink, StrongRef, Value};

use crate::context::ContextQuery;
use crate::frame::Lvid;
use crate::operators::{self, truthy, AssignOp, BinOp, UnaryOp};
use crate::parse_context::ParseContext;
use crate::program::{call_function, construct_object};
use crate::unwind::Unwind;
use crate::EvalCtx;

/// Evaluates `$node` and, if it produced anything other than `Normal`,
/// returns that unwind immediately from the enclosing `eval`. Mirrors the
/// `?` operator for the tagged-unwind channel instead of `Result`.
macro_rules! eval_or_unwind {
    ($ctx:expr, $node:expr) => {{
        match $node.eval($ctx) {
            Unwind::Normal(value) => value,
            other => return other,
        }
    }};
}

/// One node of the evaluator's AST.
#[derive(Debug)]
pub enum Node {
    Literal(Value),
    ListLit(Vec<Node>),
    HashLit(Vec<(Node, Node)>),

    Local(Lvid),
    Declare {
        name: String,
        lvid: Lvid,
        declared_type: DeclaredType,
        init: Option<Box<Node>>,
    },
    SelfRef,
    ImplicitArg(usize),

    Member { receiver: Box<Node>, name: String },
    Index { base: Box<Node>, index: Box<Node> },
    RangeIndex { base: Box<Node>, start: Box<Node>, end: Box<Node> },

    Binary { op: BinOp, left: Box<Node>, right: Box<Node> },
    Unary { op: UnaryOp, operand: Box<Node> },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Coalesce(Box<Node>, Box<Node>),
    Ternary { cond: Box<Node>, then_branch: Box<Node>, else_branch: Box<Node> },

    Assign { op: AssignOp, weak: bool, target: Box<Node>, rhs: Box<Node>, declared_type: DeclaredType },
    ListAssign { targets: Vec<Node>, rhs: Box<Node> },

    Extract { target: Box<Node>, offset: Box<Node>, len: Box<Node>, replacement: Option<Box<Node>> },
    Splice { target: Box<Node>, offset: Box<Node>, len: Box<Node>, replacement: Option<Box<Node>> },

    /// `&expr`: takes a first-class reference onto an lvalue-shaped node.
    Reference(Box<Node>),
    /// Reads through a `Value::Reference` produced by [`Node::Reference`].
    Deref(Box<Node>),

    Map { iterable: Box<Node>, elem_lvid: Lvid, body: Box<Node> },
    Select { iterable: Box<Node>, elem_lvid: Lvid, predicate: Box<Node> },
    FoldL { iterable: Box<Node>, init: Box<Node>, acc_lvid: Lvid, elem_lvid: Lvid, body: Box<Node> },
    FoldR { iterable: Box<Node>, init: Box<Node>, acc_lvid: Lvid, elem_lvid: Lvid, body: Box<Node> },
    Keys(Box<Node>),

    Seq(Vec<Node>),
    If { cond: Box<Node>, then_branch: Box<Node>, else_branch: Option<Box<Node>> },
    While { cond: Box<Node>, body: Box<Node> },
    Break,
    Continue,
    Return(Option<Box<Node>>),
    Try { body: Box<Node>, catch_lvid: Option<Lvid>, catch_body: Box<Node> },
    Throw(Box<Node>),
    Rethrow,
    ThreadExit,

    FunctionCall { name: String, args: Vec<Node> },
    MethodCall { receiver: Box<Node>, method: String, args: Vec<Node> },
    New { class_name: String, args: Vec<Node> },
    Invoke { callee: Box<Node>, args: Vec<Node> },
    Closure { captured: Vec<Lvid>, arity: usize, local_count: usize, body: Arc<Node> },
    Background(Arc<Node>),

    #[cfg(feature = "external-process")]
    Backquote(Box<Node>),

    RegexMatch { subject: Box<Node>, pattern: Box<Node>, negate: bool },
    RegexSubstitute { subject: Box<Node>, pattern: Box<Node>, replacement: Box<Node> },
    Transliterate { subject: Box<Node>, from: Box<Node>, to: Box<Node> },

    ContextQuery(ContextQuery),
}

impl Node {
    /// Parse-time bookkeeping: scope push/pop, type-info recording,
    /// background/rethrow flag enforcement, and literal constant folding.
    /// Consumes and returns `self` so a node can fold into something
    /// simpler (e.g. `1 == 1` collapsing to `Node::Literal(Value::Bool(true))`).
    pub fn parse_init(self, ctx: &mut ParseContext<'_>) -> anyhow::Result<Node> {
        Ok(match self {
            Node::Literal(_) | Node::Local(_) | Node::SelfRef | Node::ImplicitArg(_) => self,

            Node::ListLit(items) => Node::ListLit(
                items
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
            ),
            Node::HashLit(pairs) => Node::HashLit(
                pairs
                    .into_iter()
                    .map(|(k, v)| -> anyhow::Result<_> {
                        Ok((k.parse_init(&mut ctx.reborrow())?, v.parse_init(&mut ctx.reborrow())?))
                    })
                    .collect::<anyhow::Result<_>>()?,
            ),

            Node::Declare { name, lvid, declared_type, init } => {
                ctx.scope.declare(name.as_str(), lvid);
                ctx.type_info.record(lvid, declared_type.clone());
                let init = init
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .transpose()?
                    .map(Box::new);
                Node::Declare { name, lvid, declared_type, init }
            }

            Node::Member { receiver, name } => Node::Member {
                receiver: Box::new(receiver.parse_init(&mut ctx.reborrow())?),
                name,
            },
            Node::Index { base, index } => Node::Index {
                base: Box::new(base.parse_init(&mut ctx.reborrow())?),
                index: Box::new(index.parse_init(&mut ctx.reborrow())?),
            },
            Node::RangeIndex { base, start, end } => Node::RangeIndex {
                base: Box::new(base.parse_init(&mut ctx.reborrow())?),
                start: Box::new(start.parse_init(&mut ctx.reborrow())?),
                end: Box::new(end.parse_init(&mut ctx.reborrow())?),
            },

            Node::Binary { op, left, right } => {
                let left = left.parse_init(&mut ctx.reborrow())?;
                let right = right.parse_init(&mut ctx.reborrow())?;
                const_fold_binary(op, left, right)
            }
            Node::Unary { op, operand } => {
                let operand = operand.parse_init(&mut ctx.reborrow())?;
                const_fold_unary(op, operand)
            }
            Node::And(l, r) => Node::And(
                Box::new(l.parse_init(&mut ctx.reborrow())?),
                Box::new(r.parse_init(&mut ctx.reborrow())?),
            ),
            Node::Or(l, r) => Node::Or(
                Box::new(l.parse_init(&mut ctx.reborrow())?),
                Box::new(r.parse_init(&mut ctx.reborrow())?),
            ),
            Node::Coalesce(l, r) => Node::Coalesce(
                Box::new(l.parse_init(&mut ctx.reborrow())?),
                Box::new(r.parse_init(&mut ctx.reborrow())?),
            ),
            Node::Ternary { cond, then_branch, else_branch } => Node::Ternary {
                cond: Box::new(cond.parse_init(&mut ctx.reborrow())?),
                then_branch: Box::new(then_branch.parse_init(&mut ctx.reborrow())?),
                else_branch: Box::new(else_branch.parse_init(&mut ctx.reborrow())?),
            },

            Node::Assign { op, weak, target, rhs, .. } => {
                let target = target.parse_init(&mut ctx.reborrow())?;
                let rhs = rhs.parse_init(&mut ctx.reborrow())?;
                let declared_type = match &target {
                    Node::Local(lvid) => ctx.type_info.get(*lvid),
                    _ => DeclaredType::Any,
                };
                Node::Assign { op, weak, target: Box::new(target), rhs: Box::new(rhs), declared_type }
            }
            Node::ListAssign { targets, rhs } => Node::ListAssign {
                targets: targets
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
                rhs: Box::new(rhs.parse_init(&mut ctx.reborrow())?),
            },

            Node::Extract { target, offset, len, replacement } => Node::Extract {
                target: Box::new(target.parse_init(&mut ctx.reborrow())?),
                offset: Box::new(offset.parse_init(&mut ctx.reborrow())?),
                len: Box::new(len.parse_init(&mut ctx.reborrow())?),
                replacement: replacement
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .transpose()?
                    .map(Box::new),
            },
            Node::Splice { target, offset, len, replacement } => Node::Splice {
                target: Box::new(target.parse_init(&mut ctx.reborrow())?),
                offset: Box::new(offset.parse_init(&mut ctx.reborrow())?),
                len: Box::new(len.parse_init(&mut ctx.reborrow())?),
                replacement: replacement
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .transpose()?
                    .map(Box::new),
            },

            Node::Reference(inner) => {
                if !matches!(*inner, Node::Local(_) | Node::Member { .. } | Node::Index { .. }) {
                    bail!("`&` may only be taken of a local, member, or index expression");
                }
                Node::Reference(Box::new(inner.parse_init(&mut ctx.reborrow())?))
            }
            Node::Deref(inner) => Node::Deref(Box::new(inner.parse_init(&mut ctx.reborrow())?)),

            Node::Map { iterable, elem_lvid, body } => Node::Map {
                iterable: Box::new(iterable.parse_init(&mut ctx.reborrow())?),
                elem_lvid,
                body: Box::new(body.parse_init(&mut ctx.reborrow())?),
            },
            Node::Select { iterable, elem_lvid, predicate } => Node::Select {
                iterable: Box::new(iterable.parse_init(&mut ctx.reborrow())?),
                elem_lvid,
                predicate: Box::new(predicate.parse_init(&mut ctx.reborrow())?),
            },
            Node::FoldL { iterable, init, acc_lvid, elem_lvid, body } => Node::FoldL {
                iterable: Box::new(iterable.parse_init(&mut ctx.reborrow())?),
                init: Box::new(init.parse_init(&mut ctx.reborrow())?),
                acc_lvid,
                elem_lvid,
                body: Box::new(body.parse_init(&mut ctx.reborrow())?),
            },
            Node::FoldR { iterable, init, acc_lvid, elem_lvid, body } => Node::FoldR {
                iterable: Box::new(iterable.parse_init(&mut ctx.reborrow())?),
                init: Box::new(init.parse_init(&mut ctx.reborrow())?),
                acc_lvid,
                elem_lvid,
                body: Box::new(body.parse_init(&mut ctx.reborrow())?),
            },
            Node::Keys(inner) => Node::Keys(Box::new(inner.parse_init(&mut ctx.reborrow())?)),

            Node::Seq(stmts) => {
                ctx.scope.push_block();
                let result = stmts
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>();
                ctx.scope.pop_block();
                Node::Seq(result?)
            }
            Node::If { cond, then_branch, else_branch } => Node::If {
                cond: Box::new(cond.parse_init(&mut ctx.reborrow())?),
                then_branch: Box::new(then_branch.parse_init(&mut ctx.reborrow())?),
                else_branch: else_branch
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .transpose()?
                    .map(Box::new),
            },
            Node::While { cond, body } => Node::While {
                cond: Box::new(cond.parse_init(&mut ctx.reborrow())?),
                body: Box::new(body.parse_init(&mut ctx.reborrow())?),
            },
            Node::Break | Node::Continue | Node::ThreadExit => self,
            Node::Return(expr) => Node::Return(
                expr.map(|n| n.parse_init(&mut ctx.reborrow())).transpose()?.map(Box::new),
            ),
            Node::Try { body, catch_lvid, catch_body } => {
                let body = body.parse_init(&mut ctx.reborrow())?;
                let mut catch_flags = ctx.flags;
                catch_flags.rethrow_ok = true;
                let catch_body = catch_body.parse_init(&mut ctx.with_flags(catch_flags))?;
                Node::Try { body: Box::new(body), catch_lvid, catch_body: Box::new(catch_body) }
            }
            Node::Throw(inner) => Node::Throw(Box::new(inner.parse_init(&mut ctx.reborrow())?)),
            Node::Rethrow => {
                if !ctx.flags.rethrow_ok {
                    bail!("`rethrow` is only valid inside a `catch` block");
                }
                self
            }

            Node::FunctionCall { name, args } => Node::FunctionCall {
                name,
                args: args
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
            },
            Node::MethodCall { receiver, method, args } => Node::MethodCall {
                receiver: Box::new(receiver.parse_init(&mut ctx.reborrow())?),
                method,
                args: args
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
            },
            Node::New { class_name, args } => Node::New {
                class_name,
                args: args
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
            },
            Node::Invoke { callee, args } => Node::Invoke {
                callee: Box::new(callee.parse_init(&mut ctx.reborrow())?),
                args: args
                    .into_iter()
                    .map(|n| n.parse_init(&mut ctx.reborrow()))
                    .collect::<anyhow::Result<_>>()?,
            },
            Node::Closure { captured, arity, local_count, body } => {
                Node::Closure { captured, arity, local_count, body }
            }
            Node::Background(body) => {
                check_background_refs(&body).context("invalid `background` argument")?;
                Node::Background(body)
            }

            #[cfg(feature = "external-process")]
            Node::Backquote(inner) => Node::Backquote(Box::new(inner.parse_init(&mut ctx.reborrow())?)),

            Node::RegexMatch { subject, pattern, negate } => Node::RegexMatch {
                subject: Box::new(subject.parse_init(&mut ctx.reborrow())?),
                pattern: Box::new(pattern.parse_init(&mut ctx.reborrow())?),
                negate,
            },
            Node::RegexSubstitute { subject, pattern, replacement } => Node::RegexSubstitute {
                subject: Box::new(subject.parse_init(&mut ctx.reborrow())?),
                pattern: Box::new(pattern.parse_init(&mut ctx.reborrow())?),
                replacement: Box::new(replacement.parse_init(&mut ctx.reborrow())?),
            },
            Node::Transliterate { subject, from, to } => Node::Transliterate {
                subject: Box::new(subject.parse_init(&mut ctx.reborrow())?),
                from: Box::new(from.parse_init(&mut ctx.reborrow())?),
                to: Box::new(to.parse_init(&mut ctx.reborrow())?),
            },

            Node::ContextQuery(query) => Node::ContextQuery(query.parse_init(ctx)?),
        })
    }

    /// Evaluates this node against `ctx`, returning either a plain value
    /// (`Unwind::Normal`) or a request to unwind an enclosing construct.
    /// Every branch that raises an exception leaves the node's own return
    /// value as `Value::Nothing`; the sink, not the return value, is the
    /// channel a caller inspects to learn whether something went wrong.
    pub fn eval(&self, ctx: &EvalCtx<'_>) -> Unwind {
        match self {
            Node::Literal(value) => Unwind::Normal(value.clone()),
            Node::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval_or_unwind!(ctx, item));
                    if ctx.has_event() {
                        for v in values {
                            v.deref(&mut ctx.thread.sink());
                        }
                        return Unwind::Normal(Value::Nothing);
                    }
                }
                Unwind::Normal(Value::list(values))
            }
            Node::HashLit(pairs) => {
                let mut hash = QHash::new();
                for (k, v) in pairs {
                    let key = eval_or_unwind!(ctx, k);
                    let key_str = key.get_as_string();
                    key.deref(&mut ctx.thread.sink());
                    let value = eval_or_unwind!(ctx, v);
                    if ctx.has_event() {
                        value.deref(&mut ctx.thread.sink());
                        return Unwind::Normal(Value::Nothing);
                    }
                    if let Some(old) = hash.insert(key_str, value) {
                        old.deref(&mut ctx.thread.sink());
                    }
                }
                Unwind::Normal(Value::hash(hash))
            }

            Node::Local(lvid) => Unwind::Normal(ctx.frame.slot(*lvid).peek()),
            Node::Declare { lvid, declared_type, init, .. } => {
                let value = match init {
                    Some(init) => eval_or_unwind!(ctx, init),
                    None => Value::Nothing,
                };
                if ctx.has_event() {
                    value.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                let target = LvalueTarget::Local(ctx.frame.slot(*lvid).clone());
                let helper = acquire(target, declared_type.clone());
                let mut sink = ctx.thread.sink();
                let result = value.clone();
                helper.assign(value, &mut sink);
                Unwind::Normal(result)
            }
            Node::SelfRef => match ctx.thread.current_self().and_then(|w| w.upgrade()) {
                Some(strong) => Unwind::Normal(Value::Object(strong)),
                None => Unwind::Normal(Value::Nothing),
            },
            Node::ImplicitArg(index) => Unwind::Normal(ctx.thread.implicit_arg(*index)),

            Node::Member { receiver, name } => {
                let owner = eval_or_unwind!(ctx, receiver);
                let mut sink = ctx.thread.sink();
                let result = read_member(&owner, name, &mut sink);
                drop(sink);
                owner.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }
            Node::Index { base, index } => {
                let base_val = eval_or_unwind!(ctx, base);
                let index_val = eval_or_unwind!(ctx, index);
                if ctx.has_event() {
                    base_val.deref(&mut ctx.thread.sink());
                    index_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                let result = read_index(&base_val, &index_val, &mut ctx.thread.sink());
                base_val.deref(&mut ctx.thread.sink());
                index_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }
            Node::RangeIndex { base, start, end } => {
                let base_val = eval_or_unwind!(ctx, base);
                let start_val = eval_or_unwind!(ctx, start).get_as_int();
                let end_val = eval_or_unwind!(ctx, end).get_as_int();
                let result = read_range(&base_val, start_val, end_val);
                base_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }

            Node::Binary { op, left, right } => {
                let left_val = eval_or_unwind!(ctx, left);
                if ctx.has_event() {
                    left_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                let right_val = eval_or_unwind!(ctx, right);
                if ctx.has_event() {
                    left_val.deref(&mut ctx.thread.sink());
                    right_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                let mut sink = ctx.thread.sink();
                Unwind::Normal(operators::apply_binary(*op, left_val, right_val, &mut sink))
            }
            Node::Unary { op, operand } => {
                let value = eval_or_unwind!(ctx, operand);
                let mut sink = ctx.thread.sink();
                Unwind::Normal(operators::apply_unary(*op, value, &mut sink))
            }
            Node::And(left, right) => {
                let left_val = eval_or_unwind!(ctx, left);
                let left_truthy = truthy(&left_val);
                left_val.deref(&mut ctx.thread.sink());
                if !left_truthy {
                    return Unwind::Normal(Value::Bool(false));
                }
                let right_val = eval_or_unwind!(ctx, right);
                let right_truthy = truthy(&right_val);
                right_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(Value::Bool(right_truthy))
            }
            Node::Or(left, right) => {
                let left_val = eval_or_unwind!(ctx, left);
                let left_truthy = truthy(&left_val);
                left_val.deref(&mut ctx.thread.sink());
                if left_truthy {
                    return Unwind::Normal(Value::Bool(true));
                }
                let right_val = eval_or_unwind!(ctx, right);
                let right_truthy = truthy(&right_val);
                right_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(Value::Bool(right_truthy))
            }
            Node::Coalesce(left, right) => {
                // Spec's explicit open-question resolution: truthiness, not
                // null-coalescing — `0`/`""`/`nothing`/`null` all fall through.
                let left_val = eval_or_unwind!(ctx, left);
                if truthy(&left_val) {
                    return Unwind::Normal(left_val);
                }
                left_val.deref(&mut ctx.thread.sink());
                right.eval(ctx)
            }
            Node::Ternary { cond, then_branch, else_branch } => {
                let cond_val = eval_or_unwind!(ctx, cond);
                let taken = truthy(&cond_val);
                cond_val.deref(&mut ctx.thread.sink());
                if taken {
                    then_branch.eval(ctx)
                } else {
                    else_branch.eval(ctx)
                }
            }

            Node::Assign { op, weak, target, rhs, declared_type } => {
                let rhs_val = eval_or_unwind!(ctx, rhs);
                if ctx.has_event() {
                    rhs_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                eval_assign(ctx, target, *op, rhs_val, *weak, declared_type)
            }
            Node::ListAssign { targets, rhs } => {
                let rhs_val = eval_or_unwind!(ctx, rhs);
                if ctx.has_event() {
                    rhs_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                }
                eval_list_assign(ctx, targets, rhs_val)
            }

            Node::Extract { target, offset, len, replacement } => {
                eval_extract_splice(ctx, target, offset, len, replacement, true)
            }
            Node::Splice { target, offset, len, replacement } => {
                eval_extract_splice(ctx, target, offset, len, replacement, false)
            }

            Node::Reference(inner) => Unwind::Normal(eval_reference(ctx, inner)),
            Node::Deref(inner) => {
                let value = eval_or_unwind!(ctx, inner);
                let result = match &value {
                    Value::Reference(r) => r.with(QReference::peek),
                    other => other.clone(),
                };
                value.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }

            Node::Map { iterable, elem_lvid, body } => {
                let iterable_val = eval_or_unwind!(ctx, iterable);
                let elements = iterate_values(&iterable_val, ctx);
                iterable_val.deref(&mut ctx.thread.sink());
                let mut results = Vec::with_capacity(elements.len());
                for element in elements {
                    bind_local(ctx, *elem_lvid, element);
                    let mapped = eval_or_unwind!(ctx, body);
                    if ctx.has_event() {
                        mapped.deref(&mut ctx.thread.sink());
                        for r in results {
                            r.deref(&mut ctx.thread.sink());
                        }
                        return Unwind::Normal(Value::Nothing);
                    }
                    results.push(mapped);
                }
                Unwind::Normal(Value::list(results))
            }
            Node::Select { iterable, elem_lvid, predicate } => {
                let iterable_val = eval_or_unwind!(ctx, iterable);
                let elements = iterate_values(&iterable_val, ctx);
                iterable_val.deref(&mut ctx.thread.sink());
                let mut results = Vec::new();
                for element in elements {
                    bind_local(ctx, *elem_lvid, element.clone());
                    let keep = eval_or_unwind!(ctx, predicate);
                    let kept = truthy(&keep);
                    keep.deref(&mut ctx.thread.sink());
                    if kept {
                        results.push(element);
                    } else {
                        element.deref(&mut ctx.thread.sink());
                    }
                }
                Unwind::Normal(Value::list(results))
            }
            Node::FoldL { iterable, init, acc_lvid, elem_lvid, body } => {
                eval_fold(ctx, iterable, init, *acc_lvid, *elem_lvid, body, false)
            }
            Node::FoldR { iterable, init, acc_lvid, elem_lvid, body } => {
                eval_fold(ctx, iterable, init, *acc_lvid, *elem_lvid, body, true)
            }
            Node::Keys(inner) => {
                let value = eval_or_unwind!(ctx, inner);
                let result = match &value {
                    Value::Hash(h) => {
                        Value::list(h.with(|h| h.keys().map(Value::string).collect()))
                    }
                    Value::List(l) => {
                        Value::list((0..l.with(|l| l.len())).map(|i| Value::Int(i as i64)).collect())
                    }
                    Value::Object(o) => {
                        Value::list(o.with(|o| o.member_names().into_iter().map(Value::string).collect()))
                    }
                    _ => Value::list(Vec::new()),
                };
                value.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }

            Node::Seq(stmts) => {
                let mut last = Value::Nothing;
                for stmt in stmts {
                    last.deref(&mut ctx.thread.sink());
                    last = eval_or_unwind!(ctx, stmt);
                    if ctx.has_event() {
                        last.deref(&mut ctx.thread.sink());
                        return Unwind::Normal(Value::Nothing);
                    }
                }
                Unwind::Normal(last)
            }
            Node::If { cond, then_branch, else_branch } => {
                let cond_val = eval_or_unwind!(ctx, cond);
                let taken = truthy(&cond_val);
                cond_val.deref(&mut ctx.thread.sink());
                if taken {
                    then_branch.eval(ctx)
                } else if let Some(else_branch) = else_branch {
                    else_branch.eval(ctx)
                } else {
                    Unwind::Normal(Value::Nothing)
                }
            }
            Node::While { cond, body } => {
                loop {
                    let cond_val = eval_or_unwind!(ctx, cond);
                    let keep_going = truthy(&cond_val);
                    cond_val.deref(&mut ctx.thread.sink());
                    if !keep_going || ctx.has_event() {
                        break;
                    }
                    match body.eval(ctx) {
                        Unwind::Normal(v) => v.deref(&mut ctx.thread.sink()),
                        Unwind::Break => break,
                        Unwind::Continue => continue,
                        other @ (Unwind::Return(_) | Unwind::ThreadExit) => return other,
                    }
                    if ctx.has_event() {
                        break;
                    }
                }
                Unwind::Normal(Value::Nothing)
            }
            Node::Break => Unwind::Break,
            Node::Continue => Unwind::Continue,
            Node::Return(expr) => {
                let value = match expr {
                    Some(expr) => eval_or_unwind!(ctx, expr),
                    None => Value::Nothing,
                };
                Unwind::Return(value)
            }
            Node::Try { body, catch_lvid, catch_body } => {
                let result = body.eval(ctx);
                let exception = {
                    let mut sink = ctx.thread.sink();
                    if sink.is_thread_exit() {
                        None
                    } else {
                        sink.take()
                    }
                };
                match exception {
                    Some(exc) => {
                        if let Some(lvid) = catch_lvid {
                            let arg = exc.arg().cloned().unwrap_or(Value::Nothing);
                            bind_local(ctx, *lvid, arg);
                        }
                        ctx.thread.resources();
                        let pending = PENDING_CAUGHT.with(|cell| cell.replace(Some(exc)));
                        let outcome = catch_body.eval(ctx);
                        PENDING_CAUGHT.with(|cell| *cell.borrow_mut() = pending);
                        outcome
                    }
                    None => result,
                }
            }
            Node::Throw(inner) => {
                let arg = eval_or_unwind!(ctx, inner);
                ctx.thread.sink().raise_user(arg, "user exception");
                Unwind::Normal(Value::Nothing)
            }
            Node::Rethrow => {
                let caught = PENDING_CAUGHT.with(|cell| cell.borrow().clone());
                if let Some(exc) = caught {
                    let frame = CallFrame::new("rethrow", None, 0);
                    ctx.thread.sink().raise(exc.rethrow(frame));
                }
                Unwind::Normal(Value::Nothing)
            }
            Node::ThreadExit => {
                ctx.thread.sink().raise_thread_exit();
                Unwind::ThreadExit
            }

            Node::FunctionCall { name, args } => {
                let Some(def) = ctx.program.function(name) else {
                    ctx.thread.sink().raise_system(
                        ErrorKind::InvalidOperation,
                        format!("no such function '{name}'"),
                    );
                    return Unwind::Normal(Value::Nothing);
                };
                let arg_values = match eval_args(ctx, args) {
                    Some(values) => values,
                    None => return Unwind::Normal(Value::Nothing),
                };
                Unwind::Normal(call_function(&def, arg_values, None, ctx))
            }
            Node::MethodCall { receiver, method, args } => {
                let receiver_val = eval_or_unwind!(ctx, receiver);
                let Value::Object(obj) = &receiver_val else {
                    ctx.thread.sink().raise_system(
                        ErrorKind::ObjectAlreadyDeleted,
                        "method call on a non-object value",
                    );
                    receiver_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                };
                let class_name = obj.with(|o| o.class_name().to_string());
                let Some(def) = ctx.program.resolve_method(&class_name, method) else {
                    ctx.thread.sink().raise_system(
                        ErrorKind::InvalidOperation,
                        format!("no such method '{method}' on class '{class_name}'"),
                    );
                    receiver_val.deref(&mut ctx.thread.sink());
                    return Unwind::Normal(Value::Nothing);
                };
                let weak = obj.downgrade();
                let arg_values = match eval_args(ctx, args) {
                    Some(values) => values,
                    None => {
                        receiver_val.deref(&mut ctx.thread.sink());
                        return Unwind::Normal(Value::Nothing);
                    }
                };
                let result = call_function(&def, arg_values, Some(weak), ctx);
                receiver_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }
            Node::New { class_name, args } => {
                let arg_values = match eval_args(ctx, args) {
                    Some(values) => values,
                    None => return Unwind::Normal(Value::Nothing),
                };
                Unwind::Normal(construct_object(Arc::clone(ctx.program), class_name, arg_values, ctx))
            }
            Node::Invoke { callee, args } => {
                let callee_val = eval_or_unwind!(ctx, callee);
                let arg_values = match eval_args(ctx, args) {
                    Some(values) => values,
                    None => {
                        callee_val.deref(&mut ctx.thread.sink());
                        return Unwind::Normal(Value::Nothing);
                    }
                };
                let mut sink = ctx.thread.sink();
                let result = match &callee_val {
                    Value::Closure(c) => c.with(|c| c.call(arg_values, &mut sink)),
                    Value::CallRef(c) => c.with(|c| c.call(arg_values, &mut sink)),
                    _ => {
                        sink.raise_system(ErrorKind::InvalidOperation, "value is not callable");
                        for arg in arg_values {
                            arg.deref(&mut sink);
                        }
                        Value::Nothing
                    }
                };
                drop(sink);
                callee_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }
            Node::Closure { captured, arity, local_count, body } => {
                Unwind::Normal(build_closure(ctx, captured, *arity, *local_count, Arc::clone(body)))
            }
            Node::Background(body) => {
                spawn_background(ctx, Arc::clone(body));
                Unwind::Normal(Value::Nothing)
            }

            #[cfg(feature = "external-process")]
            Node::Backquote(inner) => {
                let command_val = eval_or_unwind!(ctx, inner);
                let command = command_val.get_as_string();
                command_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(run_backquote(&command, &mut ctx.thread.sink()))
            }

            Node::RegexMatch { subject, pattern, negate } => {
                let subject_val = eval_or_unwind!(ctx, subject);
                let pattern_val = eval_or_unwind!(ctx, pattern);
                let haystack = subject_val.get_as_string();
                let matched = vellum_regex::is_match(&pattern_val, &haystack);
                subject_val.deref(&mut ctx.thread.sink());
                pattern_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(Value::Bool(matched != *negate))
            }
            Node::RegexSubstitute { subject, pattern, replacement } => {
                let subject_val = eval_or_unwind!(ctx, subject);
                let pattern_val = eval_or_unwind!(ctx, pattern);
                let replacement_val = eval_or_unwind!(ctx, replacement);
                let haystack = subject_val.get_as_string();
                let replacement_str = replacement_val.get_as_string();
                let result = vellum_regex::substitute(&pattern_val, &haystack, &replacement_str);
                subject_val.deref(&mut ctx.thread.sink());
                pattern_val.deref(&mut ctx.thread.sink());
                replacement_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(result)
            }
            Node::Transliterate { subject, from, to } => {
                let subject_val = eval_or_unwind!(ctx, subject);
                let from_val = eval_or_unwind!(ctx, from);
                let to_val = eval_or_unwind!(ctx, to);
                let haystack = subject_val.get_as_string();
                let result = vellum_regex::transliterate(&haystack, &from_val.get_as_string(), &to_val.get_as_string());
                subject_val.deref(&mut ctx.thread.sink());
                from_val.deref(&mut ctx.thread.sink());
                to_val.deref(&mut ctx.thread.sink());
                Unwind::Normal(Value::string(result))
            }

            Node::ContextQuery(query) => query.eval(ctx),
        }
    }
}

thread_local! {
    /// The exception currently in scope for a `rethrow` (set for the
    /// duration of a `catch` block's body, restored on exit — supports
    /// nested `try`/`catch` the way a call stack of catch handlers would).
    static PENDING_CAUGHT: std::cell::RefCell<Option<vellum_value::Exception>> = const { std::cell::RefCell::new(None) };
}

fn bind_local(ctx: &EvalCtx<'_>, lvid: Lvid, value: Value) {
    let old = std::mem::replace(&mut *ctx.frame.slot(lvid).lock(), value);
    old.deref(&mut ctx.thread.sink());
}

fn eval_args(ctx: &EvalCtx<'_>, args: &[Node]) -> Option<Vec<Value>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg.eval(ctx) {
            Unwind::Normal(v) => values.push(v),
            _ => {
                for v in values {
                    v.deref(&mut ctx.thread.sink());
                }
                return None;
            }
        }
        if ctx.has_event() {
            for v in values {
                v.deref(&mut ctx.thread.sink());
            }
            return None;
        }
    }
    Some(values)
}

fn read_member(owner: &Value, name: &str, sink: &mut Sink) -> Value {
    match owner {
        Value::Object(o) => o.with(|o| o.get_member(name)).unwrap_or(Value::Nothing),
        Value::WeakObject(w) => match w.upgrade() {
            Some(o) => o.with(|o| o.get_member(name)).unwrap_or(Value::Nothing),
            None => {
                sink.raise_system(
                    ErrorKind::ObjectAlreadyDeleted,
                    format!("member access on an already-deleted object of class {}", w.class_name()),
                );
                Value::Nothing
            }
        },
        _ => Value::Nothing,
    }
}

fn read_index(base: &Value, index: &Value, sink: &mut Sink) -> Value {
    match base {
        Value::String(s) => {
            let i = index.get_as_int();
            s.with(|s| {
                let chars: Vec<char> = s.as_str().chars().collect();
                usize::try_from(i)
                    .ok()
                    .and_then(|i| chars.get(i))
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Nothing)
            })
        }
        Value::List(l) => {
            let i = index.get_as_int();
            usize::try_from(i)
                .ok()
                .and_then(|i| l.with(|l| l.get(i).cloned()))
                .unwrap_or(Value::Nothing)
        }
        Value::Hash(h) => {
            if matches!(index, Value::Int(_)) {
                sink.raise_system(
                    ErrorKind::InvalidOperation,
                    "indexing a hash with an integer index is not well-defined",
                );
            }
            let key = index.get_as_string();
            h.with(|h| h.get(&key).cloned()).unwrap_or(Value::Nothing)
        }
        _ => Value::Nothing,
    }
}

fn read_range(base: &Value, start: i64, end: i64) -> Value {
    match base {
        Value::String(s) => s.with(|s| {
            let total = s.char_len();
            let (start, end) = normalize_range(start, end.saturating_sub(start), total);
            Value::string(s.char_slice(start, end))
        }),
        Value::List(l) => l.with(|l| {
            let total = l.len();
            let (start, end) = normalize_range(start, end.saturating_sub(start), total);
            Value::list(l.as_slice()[start..end].to_vec())
        }),
        _ => Value::Nothing,
    }
}

/// Clamps an offset/length pair (offsets negative-from-end) to `[0, total]`.
fn normalize_range(offset: i64, len: i64, total: usize) -> (usize, usize) {
    let total_i = total as i64;
    let start = if offset < 0 { total_i + offset } else { offset }.clamp(0, total_i);
    let end = (start + len.max(0)).clamp(start, total_i);
    (start as usize, end as usize)
}

fn eval_assign(
    ctx: &EvalCtx<'_>,
    target: &Node,
    op: AssignOp,
    rhs: Value,
    weak: bool,
    declared_type: &DeclaredType,
) -> Unwind {
    let mut sink = ctx.thread.sink();
    let result = match target {
        Node::Local(lvid) => {
            let lv_target = LvalueTarget::Local(ctx.frame.slot(*lvid).clone());
            perform_assign(lv_target, declared_type.clone(), op, rhs, weak, &mut sink)
        }
        Node::Member { receiver, name } => {
            drop(sink);
            let owner_val = eval_or_unwind!(ctx, receiver);
            let mut sink = ctx.thread.sink();
            let result = match &owner_val {
                Value::Object(owner) => {
                    perform_assign(
                        LvalueTarget::Member { owner, name: name.clone() },
                        DeclaredType::Any,
                        op,
                        rhs,
                        weak,
                        &mut sink,
                    )
                }
                Value::WeakObject(w) => match w.upgrade() {
                    Some(owner) => perform_assign(
                        LvalueTarget::Member { owner: &owner, name: name.clone() },
                        DeclaredType::Any,
                        op,
                        rhs,
                        weak,
                        &mut sink,
                    ),
                    None => {
                        sink.raise_system(
                            ErrorKind::ObjectAlreadyDeleted,
                            format!("assignment to a member of an already-deleted object of class {}", w.class_name()),
                        );
                        rhs.deref(&mut sink);
                        Value::Nothing
                    }
                },
                _ => {
                    rhs.deref(&mut sink);
                    Value::Nothing
                }
            };
            owner_val.deref(&mut sink);
            return Unwind::Normal(result);
        }
        Node::Index { base, index } => {
            drop(sink);
            let base_val = eval_or_unwind!(ctx, base);
            let index_val = eval_or_unwind!(ctx, index);
            let mut sink = ctx.thread.sink();
            let result = match &base_val {
                Value::List(owner) => {
                    let Ok(i) = usize::try_from(index_val.get_as_int()) else {
                        rhs.deref(&mut sink);
                        Value::Nothing
                    };
                    perform_assign(
                        LvalueTarget::ListIndex { owner, index: i },
                        DeclaredType::Any,
                        op,
                        rhs,
                        weak,
                        &mut sink,
                    )
                }
                Value::Hash(owner) => {
                    let key = index_val.get_as_string();
                    perform_assign(
                        LvalueTarget::HashKey { owner, key },
                        DeclaredType::Any,
                        op,
                        rhs,
                        weak,
                        &mut sink,
                    )
                }
                _ => {
                    rhs.deref(&mut sink);
                    Value::Nothing
                }
            };
            base_val.deref(&mut sink);
            index_val.deref(&mut sink);
            return Unwind::Normal(result);
        }
        Node::Deref(inner) => {
            drop(sink);
            let ref_val = eval_or_unwind!(ctx, inner);
            let mut sink = ctx.thread.sink();
            let result = match &ref_val {
                Value::Reference(r) => r.with(|r| assign_through_reference(r, op, rhs, weak, &mut sink)),
                _ => {
                    rhs.deref(&mut sink);
                    Value::Nothing
                }
            };
            ref_val.deref(&mut sink);
            return Unwind::Normal(result);
        }
        _ => {
            sink.raise_system(ErrorKind::InvalidOperation, "expression is not assignable");
            rhs.deref(&mut sink);
            Value::Nothing
        }
    };
    Unwind::Normal(result)
}

fn perform_assign(
    target: LvalueTarget<'_>,
    declared_type: DeclaredType,
    op: AssignOp,
    rhs: Value,
    weak: bool,
    sink: &mut Sink,
) -> Value {
    let helper = acquire(target, declared_type);
    let new_value = match op.as_binop() {
        None => rhs,
        Some(binop) => {
            let old = helper.get();
            operators::apply_binary(binop, old, rhs, sink)
        }
    };
    let installed = if weak {
        let w = new_value.downgrade();
        new_value.deref(sink);
        w
    } else {
        new_value
    };
    let result = installed.clone();
    helper.assign(installed, sink);
    result
}

fn assign_through_reference(qref: &QReference, op: AssignOp, rhs: Value, weak: bool, sink: &mut Sink) -> Value {
    match qref.target() {
        ReferenceTarget::Local(slot) => {
            perform_assign(LvalueTarget::Local(slot.clone()), DeclaredType::Any, op, rhs, weak, sink)
        }
        ReferenceTarget::Member { owner, name } => match owner.upgrade() {
            Some(owner) => perform_assign(
                LvalueTarget::Member { owner: &owner, name: name.clone() },
                DeclaredType::Any,
                op,
                rhs,
                weak,
                sink,
            ),
            None => {
                rhs.deref(sink);
                Value::Nothing
            }
        },
        ReferenceTarget::HashKey { owner, key } => match owner.upgrade() {
            Some(owner) => perform_assign(
                LvalueTarget::HashKey { owner: &owner, key: key.clone() },
                DeclaredType::Any,
                op,
                rhs,
                weak,
                sink,
            ),
            None => {
                rhs.deref(sink);
                Value::Nothing
            }
        },
        ReferenceTarget::ListIndex { owner, index } => match owner.upgrade() {
            Some(owner) => perform_assign(
                LvalueTarget::ListIndex { owner: &owner, index: *index },
                DeclaredType::Any,
                op,
                rhs,
                weak,
                sink,
            ),
            None => {
                rhs.deref(sink);
                Value::Nothing
            }
        },
    }
}

/// `(a, b, c) = expr`: position-wise when `rhs` is a list, else the first
/// target gets the whole value and the rest get `Nothing`.
fn eval_list_assign(ctx: &EvalCtx<'_>, targets: &[Node], rhs: Value) -> Unwind {
    let mut sink = ctx.thread.sink();
    let elements: Vec<Value> = match &rhs {
        Value::List(l) => l.with(|l| l.iter().cloned().collect()),
        _ => Vec::new(),
    };
    drop(sink);
    if let Value::List(_) = &rhs {
        for (i, target) in targets.iter().enumerate() {
            let value = elements.get(i).cloned().unwrap_or(Value::Nothing);
            let outcome = eval_assign(ctx, target, AssignOp::Assign, value, false, &DeclaredType::Any);
            if outcome.is_unwinding() {
                return outcome;
            }
        }
        rhs.deref(&mut ctx.thread.sink());
    } else {
        for (i, target) in targets.iter().enumerate() {
            let value = if i == 0 { rhs.clone() } else { Value::Nothing };
            let outcome = eval_assign(ctx, target, AssignOp::Assign, value, false, &DeclaredType::Any);
            if outcome.is_unwinding() {
                return outcome;
            }
        }
        rhs.deref(&mut ctx.thread.sink());
    }
    Unwind::Normal(Value::Nothing)
}

fn eval_extract_splice(
    ctx: &EvalCtx<'_>,
    target: &Node,
    offset: &Node,
    len: &Node,
    replacement: &Option<Box<Node>>,
    is_extract: bool,
) -> Unwind {
    let current = eval_or_unwind!(ctx, target);
    let off = eval_or_unwind!(ctx, offset).get_as_int();
    let count = eval_or_unwind!(ctx, len).get_as_int();
    let repl = match replacement {
        Some(r) => eval_or_unwind!(ctx, r),
        None => Value::Nothing,
    };
    let mut sink = ctx.thread.sink();
    let result = match &current {
        Value::List(owner) => {
            let total = owner.with(|l| l.len());
            let (start, end) = normalize_range(off, count, total);
            let replacement_items = match &repl {
                Value::List(r) => r.with(|l| l.as_slice().to_vec()),
                Value::Nothing => Vec::new(),
                other => vec![other.clone()],
            };
            let removed = owner.with_mut(|l| l.splice(start, end, replacement_items));
            if is_extract {
                Value::list(removed)
            } else {
                for v in removed {
                    v.deref(&mut sink);
                }
                current.clone()
            }
        }
        Value::String(owner) => {
            let (removed, rewritten) = owner.with(|s| {
                let total = s.char_len();
                let (start, end) = normalize_range(off, count, total);
                let chars: Vec<char> = s.as_str().chars().collect();
                let removed: String = chars[start..end].iter().collect();
                let mut rewritten = String::new();
                rewritten.extend(&chars[..start]);
                rewritten.push_str(&repl.get_as_string());
                rewritten.extend(&chars[end..]);
                (removed, rewritten)
            });
            owner.with_mut(|s| {
                let encoding = s.encoding();
                *s = vellum_value::QString::with_encoding(rewritten, encoding);
            });
            if is_extract {
                Value::string(removed)
            } else {
                current.clone()
            }
        }
        _ => Value::Nothing,
    };
    repl.deref(&mut sink);
    if !matches!(current, Value::List(_) | Value::String(_)) {
        current.deref(&mut sink);
    } else if is_extract {
        current.deref(&mut sink);
    }
    Unwind::Normal(result)
}

fn eval_reference(ctx: &EvalCtx<'_>, inner: &Node) -> Value {
    let target = match inner {
        Node::Local(lvid) => Some(ReferenceTarget::Local(ctx.frame.slot(*lvid).clone())),
        Node::Member { receiver, name } => {
            let owner = receiver.eval(ctx).into_value();
            let result = match &owner {
                Value::Object(o) => Some(ReferenceTarget::Member { owner: o.downgrade(), name: name.clone() }),
                _ => None,
            };
            owner.deref(&mut ctx.thread.sink());
            result
        }
        Node::Index { base, index } => {
            let base_val = base.eval(ctx).into_value();
            let index_val = index.eval(ctx).into_value();
            let result = match &base_val {
                Value::List(l) => usize::try_from(index_val.get_as_int())
                    .ok()
                    .map(|i| ReferenceTarget::ListIndex { owner: l.downgrade(), index: i }),
                Value::Hash(h) => {
                    Some(ReferenceTarget::HashKey { owner: h.downgrade(), key: index_val.get_as_string() })
                }
                _ => None,
            };
            base_val.deref(&mut ctx.thread.sink());
            index_val.deref(&mut ctx.thread.sink());
            result
        }
        _ => None,
    };
    match target {
        Some(target) => Value::Reference(StrongRef::new(QReference::new(target))),
        None => Value::Nothing,
    }
}

fn eval_fold(
    ctx: &EvalCtx<'_>,
    iterable: &Node,
    init: &Node,
    acc_lvid: Lvid,
    elem_lvid: Lvid,
    body: &Node,
    reverse: bool,
) -> Unwind {
    let iterable_val = eval_or_unwind!(ctx, iterable);
    let mut elements = iterate_values(&iterable_val, ctx);
    iterable_val.deref(&mut ctx.thread.sink());
    if reverse {
        elements.reverse();
    }
    let acc = eval_or_unwind!(ctx, init);
    bind_local(ctx, acc_lvid, acc);
    for element in elements {
        bind_local(ctx, elem_lvid, element);
        let next = eval_or_unwind!(ctx, body);
        if ctx.has_event() {
            next.deref(&mut ctx.thread.sink());
            return Unwind::Normal(Value::Nothing);
        }
        bind_local(ctx, acc_lvid, next);
    }
    Unwind::Normal(ctx.frame.slot(acc_lvid).peek())
}

/// Values the `map`/`select`/`foldl`/`foldr` operators iterate over: list
/// elements, `(key, value)` pairs for a hash in insertion order, or
/// repeated `next()`/`getValue()` calls for an object implementing the
/// iterator capability.
pub(crate) fn iterate_values(value: &Value, ctx: &EvalCtx<'_>) -> Vec<Value> {
    match value {
        Value::List(l) => l.with(|l| l.iter().cloned().collect()),
        Value::Hash(h) => h.with(|h| {
            h.iter()
                .map(|(k, v)| Value::list(vec![Value::string(k.to_string()), v.clone()]))
                .collect()
        }),
        Value::Object(o) => {
            let class_name = o.with(|o| o.class_name().to_string());
            let (Some(next_def), Some(get_def)) = (
                ctx.program.resolve_method(&class_name, "next"),
                ctx.program.resolve_method(&class_name, "getValue"),
            ) else {
                return Vec::new();
            };
            let mut values = Vec::new();
            loop {
                let has_next = call_function(&next_def, Vec::new(), Some(o.downgrade()), ctx);
                let keep_going = truthy(&has_next);
                has_next.deref(&mut ctx.thread.sink());
                if !keep_going || ctx.has_event() {
                    break;
                }
                values.push(call_function(&get_def, Vec::new(), Some(o.downgrade()), ctx));
            }
            values
        }
        _ => Vec::new(),
    }
}

/// Builds a `Value::Closure` that rebinds `captured` slots (cloned by
/// identity, per spec §4.5.4) as the frame's leading slots on each
/// invocation, followed by the invocation's own fresh arguments.
fn build_closure(ctx: &EvalCtx<'_>, captured: &[Lvid], arity: usize, local_count: usize, body: Arc<Node>) -> Value {
    let captured_slots: Vec<_> = captured.iter().map(|&lvid| ctx.frame.slot(lvid).clone()).collect();
    let program = Arc::clone(ctx.program);
    let current_self = ctx.thread.current_self();

    let invoke: Arc<vellum_value::ClosureFn> = Arc::new(move |args, sink| {
        // A closure only ever runs re-entrantly on the thread that created
        // it (the runtime never sends a `Value::Closure` across an OS
        // thread boundary without going through `background`, which builds
        // its own thread-local `ThreadContext`), so this always resolves to
        // the same context `ctx.thread` named at closure-creation time.
        let Some(thread) = vellum_threads::current() else {
            sink.raise_system(ErrorKind::InvalidOperation, "closure invoked off its owning thread");
            return Value::Nothing;
        };
        let prefix: Vec<_> = captured_slots
            .iter()
            .cloned()
            .chain(args.into_iter().take(arity).map(vellum_value::LocalSlot::new))
            .collect();
        let frame = crate::frame::Frame::from_prefix(prefix, local_count);
        if let Some(receiver) = current_self.clone() {
            thread.push_self(receiver);
        }
        let call_ctx = EvalCtx { frame: &frame, thread: &thread, program: &program };
        let result = body.eval(&call_ctx).into_value();
        if current_self.is_some() {
            thread.pop_self();
        }
        if thread.sink().is_event() {
            result.deref(sink);
            return Value::Nothing;
        }
        result
    });
    Value::Closure(StrongRef::new(vellum_value::QClosure::new(captured.len(), invoke)))
}

/// Spawns `body` on a fresh OS thread with its own empty sink/lock-stack/
/// implicit-arg stack, per spec §4.5.5. The spawning thread's TID is
/// allocated synchronously (by the time this call returns); the new
/// thread's return value is discarded.
fn spawn_background(ctx: &EvalCtx<'_>, body: Arc<Node>) {
    let program = Arc::clone(ctx.program);
    std::thread::spawn(move || {
        let handle = vellum_threads::ThreadContext::attach();
        let context = handle.context();
        let frame = crate::frame::Frame::new(0);
        let call_ctx = EvalCtx { frame: &frame, thread: &context, program: &program };
        let result = body.eval(&call_ctx).into_value();
        result.deref(&mut context.sink());
    });
}

#[cfg(feature = "external-process")]
fn run_backquote(command: &str, sink: &mut Sink) -> Value {
    use std::process::{Command, Stdio};
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();
    match output {
        Ok(output) => Value::string(String::from_utf8_lossy(&output.stdout).into_owned()),
        Err(err) => {
            sink.raise_system(ErrorKind::BackquoteError, err.to_string());
            Value::Nothing
        }
    }
}

fn const_fold_binary(op: BinOp, left: Node, right: Node) -> Node {
    if let (Node::Literal(l), Node::Literal(r)) = (&left, &right) {
        let folded = match (op, l, r) {
            (BinOp::Add, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.wrapping_add(*b))),
            (BinOp::Sub, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.wrapping_sub(*b))),
            (BinOp::Mul, Value::Int(a), Value::Int(b)) => Some(Value::Int(a.wrapping_mul(*b))),
            (BinOp::HardEq, a, b) => Some(Value::Bool(vellum_value::hard_eq(a, b))),
            (BinOp::HardNe, a, b) => Some(Value::Bool(!vellum_value::hard_eq(a, b))),
            _ => None,
        };
        if let Some(value) = folded {
            return Node::Literal(value);
        }
    }
    Node::Binary { op, left: Box::new(left), right: Box::new(right) }
}

fn const_fold_unary(op: UnaryOp, operand: Node) -> Node {
    if let Node::Literal(value) = &operand {
        let folded = match (op, value) {
            (UnaryOp::Neg, Value::Int(i)) => Some(Value::Int(-i)),
            (UnaryOp::Neg, Value::Float(f)) => Some(Value::Float(-f)),
            (UnaryOp::Not, other) => Some(Value::Bool(!operators::truthy(other))),
            _ => None,
        };
        if let Some(value) = folded {
            return Node::Literal(value);
        }
    }
    Node::Unary { op, operand: Box::new(operand) }
}

/// Enforces the `background` rule that every local-variable reference
/// inside the argument expression must go through `&ref` rather than a
/// bare read — a bare read would race the spawning thread's frame, which
/// may already be gone by the time the background thread runs.
fn check_background_refs(node: &Node) -> anyhow::Result<()> {
    match node {
        Node::Local(_) => bail!("local variable read inside `background` must be taken by `&ref`"),
        Node::Reference(_) => Ok(()),
        Node::Literal(_) | Node::SelfRef | Node::ImplicitArg(_) | Node::Break | Node::Continue | Node::ThreadExit | Node::Rethrow => Ok(()),
        Node::ListLit(items) => items.iter().try_for_each(check_background_refs),
        Node::HashLit(pairs) => pairs.iter().try_for_each(|(k, v)| {
            check_background_refs(k)?;
            check_background_refs(v)
        }),
        Node::Declare { init, .. } => init.as_deref().map_or(Ok(()), check_background_refs),
        Node::Member { receiver, .. } => check_background_refs(receiver),
        Node::Index { base, index } => {
            check_background_refs(base)?;
            check_background_refs(index)
        }
        Node::RangeIndex { base, start, end } => {
            check_background_refs(base)?;
            check_background_refs(start)?;
            check_background_refs(end)
        }
        Node::Binary { left, right, .. } | Node::And(left, right) | Node::Or(left, right) | Node::Coalesce(left, right) => {
            check_background_refs(left)?;
            check_background_refs(right)
        }
        Node::Unary { operand, .. } => check_background_refs(operand),
        Node::Ternary { cond, then_branch, else_branch } => {
            check_background_refs(cond)?;
            check_background_refs(then_branch)?;
            check_background_refs(else_branch)
        }
        Node::Assign { target, rhs, .. } => {
            check_background_refs(target)?;
            check_background_refs(rhs)
        }
        Node::ListAssign { targets, rhs } => {
            targets.iter().try_for_each(check_background_refs)?;
            check_background_refs(rhs)
        }
        Node::Extract { target, offset, len, replacement } | Node::Splice { target, offset, len, replacement } => {
            check_background_refs(target)?;
            check_background_refs(offset)?;
            check_background_refs(len)?;
            replacement.as_deref().map_or(Ok(()), check_background_refs)
        }
        Node::Deref(inner) => check_background_refs(inner),
        Node::Map { iterable, body, .. } => {
            check_background_refs(iterable)?;
            check_background_refs(body)
        }
        Node::Select { iterable, predicate, .. } => {
            check_background_refs(iterable)?;
            check_background_refs(predicate)
        }
        Node::FoldL { iterable, init, body, .. } | Node::FoldR { iterable, init, body, .. } => {
            check_background_refs(iterable)?;
            check_background_refs(init)?;
            check_background_refs(body)
        }
        Node::Keys(inner) => check_background_refs(inner),
        Node::Seq(stmts) => stmts.iter().try_for_each(check_background_refs),
        Node::If { cond, then_branch, else_branch } => {
            check_background_refs(cond)?;
            check_background_refs(then_branch)?;
            else_branch.as_deref().map_or(Ok(()), check_background_refs)
        }
        Node::While { cond, body } => {
            check_background_refs(cond)?;
            check_background_refs(body)
        }
        Node::Return(expr) => expr.as_deref().map_or(Ok(()), check_background_refs),
        Node::Try { body, catch_body, .. } => {
            check_background_refs(body)?;
            check_background_refs(catch_body)
        }
        Node::Throw(inner) => check_background_refs(inner),
        Node::FunctionCall { args, .. } => args.iter().try_for_each(check_background_refs),
        Node::MethodCall { receiver, args, .. } => {
            check_background_refs(receiver)?;
            args.iter().try_for_each(check_background_refs)
        }
        Node::New { args, .. } => args.iter().try_for_each(check_background_refs),
        Node::Invoke { callee, args } => {
            check_background_refs(callee)?;
            args.iter().try_for_each(check_background_refs)
        }
        Node::Closure { .. } => Ok(()),
        Node::Background(_) => Ok(()),
        #[cfg(feature = "external-process")]
        Node::Backquote(inner) => check_background_refs(inner),
        Node::RegexMatch { subject, pattern, .. } => {
            check_background_refs(subject)?;
            check_background_refs(pattern)
        }
        Node::RegexSubstitute { subject, pattern, replacement } => {
            check_background_refs(subject)?;
            check_background_refs(pattern)?;
            check_background_refs(replacement)
        }
        Node::Transliterate { subject, from, to } => {
            check_background_refs(subject)?;
            check_background_refs(from)?;
            check_background_refs(to)
        }
        Node::ContextQuery(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::parse_context::{ParseFlags, Scope, TypeInfo};
    use crate::program::Program;

    fn run(node: Node, local_count: usize) -> (Value, bool) {
        let handle = vellum_threads::ThreadContext::attach();
        let thread = handle.context();
        let frame = Frame::new(local_count);
        let program = Arc::new(Program::new());
        let ctx = EvalCtx { frame: &frame, thread: &thread, program: &program };
        let value = node.eval(&ctx).into_value();
        let had_event = thread.sink().is_event();
        (value, had_event)
    }

    fn parse(node: Node) -> Node {
        let mut scope = Scope::new();
        let mut count = 0usize;
        let mut type_info = TypeInfo::new();
        let mut ctx = ParseContext {
            scope: &mut scope,
            flags: ParseFlags::default(),
            lvid_count: &mut count,
            type_info: &mut type_info,
        };
        node.parse_init(&mut ctx).unwrap()
    }

    #[test]
    fn test_literal_evals_to_itself() {
        let (value, event) = run(Node::Literal(Value::Int(42)), 0);
        assert!(matches!(value, Value::Int(42)));
        assert!(!event);
    }

    #[test]
    fn test_const_folds_int_addition_at_parse_time() {
        let folded = parse(Node::Binary {
            op: BinOp::Add,
            left: Box::new(Node::Literal(Value::Int(1))),
            right: Box::new(Node::Literal(Value::Int(2))),
        });
        assert!(matches!(folded, Node::Literal(Value::Int(3))));
    }

    #[test]
    fn test_and_short_circuits_without_evaluating_right() {
        let node = Node::And(
            Box::new(Node::Literal(Value::Bool(false))),
            Box::new(Node::FunctionCall { name: "nonexistent".into(), args: Vec::new() }),
        );
        let (value, event) = run(node, 0);
        assert!(matches!(value, Value::Bool(false)));
        assert!(!event);
    }

    #[test]
    fn test_coalesce_uses_truthiness_not_null_coalescing() {
        let node = Node::Coalesce(
            Box::new(Node::Literal(Value::Int(0))),
            Box::new(Node::Literal(Value::Int(5))),
        );
        let (value, _) = run(node, 0);
        assert!(matches!(value, Value::Int(5)));
    }

    #[test]
    fn test_local_declare_and_read() {
        let node = Node::Seq(vec![
            Node::Declare {
                name: "x".into(),
                lvid: 0,
                declared_type: DeclaredType::Int,
                init: Some(Box::new(Node::Literal(Value::Int(7)))),
            },
            Node::Local(0),
        ]);
        let (value, _) = run(node, 1);
        assert!(matches!(value, Value::Int(7)));
    }

    #[test]
    fn test_compound_assign_adds_in_place() {
        let node = Node::Seq(vec![
            Node::Declare {
                name: "x".into(),
                lvid: 0,
                declared_type: DeclaredType::Any,
                init: Some(Box::new(Node::Literal(Value::Int(10)))),
            },
            Node::Assign {
                op: AssignOp::Add,
                weak: false,
                target: Box::new(Node::Local(0)),
                rhs: Box::new(Node::Literal(Value::Int(5))),
                declared_type: DeclaredType::Any,
            },
        ]);
        let (value, _) = run(node, 1);
        assert!(matches!(value, Value::Int(15)));
    }

    #[test]
    fn test_list_index_out_of_range_is_nothing() {
        let node = Node::Index {
            base: Box::new(Node::Literal(Value::list(vec![Value::Int(1)]))),
            index: Box::new(Node::Literal(Value::Int(9))),
        };
        let (value, _) = run(node, 0);
        assert!(matches!(value, Value::Nothing));
    }

    #[test]
    fn test_map_over_list_doubles_elements() {
        let node = Node::Map {
            iterable: Box::new(Node::Literal(Value::list(vec![Value::Int(1), Value::Int(2)]))),
            elem_lvid: 0,
            body: Box::new(Node::Binary {
                op: BinOp::Mul,
                left: Box::new(Node::Local(0)),
                right: Box::new(Node::Literal(Value::Int(2))),
            }),
        };
        let (value, _) = run(node, 1);
        match value {
            Value::List(l) => {
                let items: Vec<i64> = l.with(|l| l.iter().map(|v| v.get_as_int()).collect());
                assert_eq!(items, vec![2, 4]);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_foldl_sums_list() {
        let node = Node::FoldL {
            iterable: Box::new(Node::Literal(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))),
            init: Box::new(Node::Literal(Value::Int(0))),
            acc_lvid: 0,
            elem_lvid: 1,
            body: Box::new(Node::Binary {
                op: BinOp::Add,
                left: Box::new(Node::Local(0)),
                right: Box::new(Node::Local(1)),
            }),
        };
        let (value, _) = run(node, 2);
        assert!(matches!(value, Value::Int(6)));
    }

    #[test]
    fn test_extract_removes_range_from_list() {
        let node = Node::Extract {
            target: Box::new(Node::Literal(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))),
            offset: Box::new(Node::Literal(Value::Int(1))),
            len: Box::new(Node::Literal(Value::Int(1))),
            replacement: None,
        };
        let (value, _) = run(node, 0);
        match value {
            Value::List(l) => assert_eq!(l.with(|l| l.len()), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_background_rejects_bare_local_read() {
        let node = Node::Background(Arc::new(Node::Local(0)));
        assert!(parse_catch(node).is_err());
    }

    fn parse_catch(node: Node) -> anyhow::Result<Node> {
        let mut scope = Scope::new();
        let mut count = 1usize;
        let mut type_info = TypeInfo::new();
        let mut ctx = ParseContext {
            scope: &mut scope,
            flags: ParseFlags::default(),
            lvid_count: &mut count,
            type_info: &mut type_info,
        };
        node.parse_init(&mut ctx)
    }

    #[test]
    fn test_division_by_zero_raises_and_unwinds_to_nothing_value() {
        let node = Node::Binary {
            op: BinOp::Div,
            left: Box::new(Node::Literal(Value::Int(1))),
            right: Box::new(Node::Literal(Value::Int(0))),
        };
        let (value, event) = run(node, 0);
        assert!(matches!(value, Value::Nothing));
        assert!(event);
    }

    #[test]
    fn test_member_read_through_dead_weak_object_raises_object_already_deleted() {
        // Spec §8 scenario 4: create an object, take a weak reference, drop
        // the strong reference, then read through the weak handle.
        let strong = Value::object(vellum_value::QObject::new("Widget"));
        let weak = strong.downgrade();
        let mut sink: Sink = vellum_exceptions::Sink::new();
        strong.deref(&mut sink);
        assert!(!sink.is_event());

        let node = Node::Member { receiver: Box::new(Node::Literal(weak)), name: "anything".into() };
        let handle = vellum_threads::ThreadContext::attach();
        let thread = handle.context();
        let frame = Frame::new(0);
        let program = Arc::new(Program::new());
        let ctx = EvalCtx { frame: &frame, thread: &thread, program: &program };
        let value = node.eval(&ctx).into_value();
        assert!(matches!(value, Value::Nothing));
        let mut sink = thread.sink();
        assert!(sink.is_exception());
        let exc = sink.peek().expect("exception recorded");
        assert_eq!(exc.error_code(), Some("OBJECT-ALREADY-DELETED"));
        assert!(exc.description().contains("Widget"));
        sink.clear();
    }

    #[test]
    fn test_member_assign_through_dead_weak_object_raises_object_already_deleted() {
        let strong = Value::object(vellum_value::QObject::new("Gadget"));
        let weak = strong.downgrade();
        let mut sink: Sink = vellum_exceptions::Sink::new();
        strong.deref(&mut sink);

        let node = Node::Assign {
            target: Box::new(Node::Member { receiver: Box::new(Node::Literal(weak)), name: "field".into() }),
            op: AssignOp::Assign,
            rhs: Box::new(Node::Literal(Value::Int(1))),
            weak: false,
            declared_type: DeclaredType::Any,
        };
        let (value, event) = run(node, 0);
        assert!(matches!(value, Value::Nothing));
        assert!(event);
    }
}
