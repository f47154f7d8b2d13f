// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The `find`/`context`/`summarize` declarative sublanguage (spec §4.5.3).
//!
//! A **context** is a row-major view over either a list of hashes or a hash
//! of equal-length lists; either shape is normalized here into a plain
//! `Vec<Value>` of per-row `Value::Hash`es. `%col`, `NAME:col`, and `%%`
//! inside a query body are not special AST nodes: whoever builds the tree
//! desugars them into ordinary [`crate::ast::Node::Local`]/`Index` reads
//! against the row lvid this module binds before each iteration, so `BODY`
//! is evaluated through the same `Node::eval` dispatch as everything else.

use vellum_value::{Coerce, QHash, Value};

use crate::ast::Node;
use crate::frame::Lvid;
use crate::operators::truthy;
use crate::unwind::Unwind;
use crate::EvalCtx;

/// `sort-by ASC|DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// `find COLS where PRED`.
#[derive(Debug)]
pub struct FindQuery {
    pub source: Box<Node>,
    pub row_lvid: Lvid,
    pub predicate: Box<Node>,
    pub columns: Vec<String>,
}

/// `context NAME (EXPR) where PRED sort-by DIR BODY`.
#[derive(Debug)]
pub struct ContextIterate {
    pub source: Box<Node>,
    pub row_lvid: Lvid,
    pub predicate: Option<Box<Node>>,
    pub sort_key: Option<(Box<Node>, SortDir)>,
    pub body: Box<Node>,
}

/// `summarize BODY by KEY`: groups adjacent rows sharing `KEY`'s value and
/// runs `BODY` once per group, with `row_lvid` bound to the group's first
/// row (for reading key columns) and `group_lvid` bound to the full list of
/// member rows (for any per-group aggregation `BODY` performs itself, e.g.
/// via `foldl`).
#[derive(Debug)]
pub struct SummarizeQuery {
    pub source: Box<Node>,
    pub row_lvid: Lvid,
    pub group_lvid: Lvid,
    pub key: Box<Node>,
    pub body: Box<Node>,
}

#[derive(Debug)]
pub enum ContextQuery {
    Find(FindQuery),
    Iterate(ContextIterate),
    Summarize(SummarizeQuery),
}

impl ContextQuery {
    pub fn parse_init(self, ctx: &mut crate::parse_context::ParseContext<'_>) -> anyhow::Result<Self> {
        Ok(match self {
            ContextQuery::Find(q) => ContextQuery::Find(FindQuery {
                source: Box::new(q.source.parse_init(&mut ctx.reborrow())?),
                row_lvid: q.row_lvid,
                predicate: Box::new(q.predicate.parse_init(&mut ctx.reborrow())?),
                columns: q.columns,
            }),
            ContextQuery::Iterate(q) => ContextQuery::Iterate(ContextIterate {
                source: Box::new(q.source.parse_init(&mut ctx.reborrow())?),
                row_lvid: q.row_lvid,
                predicate: q
                    .predicate
                    .map(|p| p.parse_init(&mut ctx.reborrow()))
                    .transpose()?
                    .map(Box::new),
                sort_key: match q.sort_key {
                    Some((k, dir)) => Some((Box::new(k.parse_init(&mut ctx.reborrow())?), dir)),
                    None => None,
                },
                body: Box::new(q.body.parse_init(&mut ctx.reborrow())?),
            }),
            ContextQuery::Summarize(q) => ContextQuery::Summarize(SummarizeQuery {
                source: Box::new(q.source.parse_init(&mut ctx.reborrow())?),
                row_lvid: q.row_lvid,
                group_lvid: q.group_lvid,
                key: Box::new(q.key.parse_init(&mut ctx.reborrow())?),
                body: Box::new(q.body.parse_init(&mut ctx.reborrow())?),
            }),
        })
    }

    pub fn eval(&self, ctx: &EvalCtx<'_>) -> Unwind {
        match self {
            ContextQuery::Find(q) => eval_find(q, ctx),
            ContextQuery::Iterate(q) => eval_iterate(q, ctx),
            ContextQuery::Summarize(q) => eval_summarize(q, ctx),
        }
    }
}

/// Evaluates a source/predicate/sort-key/group-key sub-expression. These
/// positions are declarative (filters and projections, not statements), so
/// a `return`/`break`/`thread-exit` inside one simply aborts the query as
/// `Nothing` rather than propagating past it — only `BODY` itself forwards
/// its `Unwind` to the caller.
fn eval_node(node: &Node, ctx: &EvalCtx<'_>) -> Option<Value> {
    match node.eval(ctx) {
        Unwind::Normal(v) => Some(v),
        _ => None,
    }
}

fn bind_row(ctx: &EvalCtx<'_>, lvid: Lvid, value: Value) {
    let old = std::mem::replace(&mut *ctx.frame.slot(lvid).lock(), value);
    old.deref(&mut ctx.thread.sink());
}

/// Normalizes `value` into per-row `Value::Hash`es: passed through as-is
/// for a list of hashes, transposed column-by-column for a hash of
/// equal-length lists, empty otherwise.
fn context_rows(value: &Value) -> Vec<Value> {
    match value {
        Value::List(l) => l.with(|l| l.iter().cloned().collect()),
        Value::Hash(h) => h.with(|h| {
            let column_names: Vec<&str> = h.keys().collect();
            let len = column_names
                .iter()
                .filter_map(|name| h.get(name))
                .filter_map(|v| match v {
                    Value::List(l) => Some(l.with(|l| l.len())),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            (0..len)
                .map(|i| {
                    let mut row = QHash::new();
                    for name in &column_names {
                        if let Some(Value::List(l)) = h.get(name) {
                            let cell = l.with(|l| l.get(i).cloned()).unwrap_or(Value::Nothing);
                            row.insert((*name).to_string(), cell);
                        }
                    }
                    Value::hash(row)
                })
                .collect()
        }),
        _ => Vec::new(),
    }
}

fn project_columns(row: &Value, columns: &[String]) -> Value {
    let Value::Hash(h) = row else {
        return Value::Nothing;
    };
    h.with(|h| {
        let mut projected = QHash::new();
        for col in columns {
            let cell = h.get(col).cloned().unwrap_or(Value::Nothing);
            projected.insert(col.clone(), cell);
        }
        Value::hash(projected)
    })
}

fn eval_find(q: &FindQuery, ctx: &EvalCtx<'_>) -> Unwind {
    let Some(source_val) = eval_node(&q.source, ctx) else {
        return Unwind::Normal(Value::Nothing);
    };
    let rows = context_rows(&source_val);
    source_val.deref(&mut ctx.thread.sink());

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        bind_row(ctx, q.row_lvid, row.clone());
        let Some(keep) = eval_node(&q.predicate, ctx) else {
            row.deref(&mut ctx.thread.sink());
            for r in results {
                r.deref(&mut ctx.thread.sink());
            }
            return Unwind::Normal(Value::Nothing);
        };
        let matched = truthy(&keep);
        keep.deref(&mut ctx.thread.sink());
        if matched {
            results.push(project_columns(&row, &q.columns));
        }
        row.deref(&mut ctx.thread.sink());
        if ctx.has_event() {
            for r in results {
                r.deref(&mut ctx.thread.sink());
            }
            return Unwind::Normal(Value::Nothing);
        }
    }
    Unwind::Normal(Value::list(results))
}

fn eval_iterate(q: &ContextIterate, ctx: &EvalCtx<'_>) -> Unwind {
    let Some(source_val) = eval_node(&q.source, ctx) else {
        return Unwind::Normal(Value::Nothing);
    };
    let mut rows = context_rows(&source_val);
    source_val.deref(&mut ctx.thread.sink());

    if let Some(predicate) = &q.predicate {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            bind_row(ctx, q.row_lvid, row.clone());
            let matched = eval_node(predicate, ctx).is_some_and(|keep| {
                let truth = truthy(&keep);
                keep.deref(&mut ctx.thread.sink());
                truth
            });
            if matched {
                kept.push(row);
            } else {
                row.deref(&mut ctx.thread.sink());
            }
        }
        rows = kept;
    }

    if let Some((key_expr, dir)) = &q.sort_key {
        let mut keyed: Vec<(Value, Value)> = rows
            .into_iter()
            .map(|row| {
                bind_row(ctx, q.row_lvid, row.clone());
                let key = eval_node(key_expr, ctx).unwrap_or(Value::Nothing);
                (key, row)
            })
            .collect();
        // Sorts are stable (spec §4.5.3); `sort_by_key`-equivalent compare
        // never needs a tiebreaker beyond source order, which `sort_by`
        // preserves for equal keys.
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = compare_sort_keys(a, b);
            match dir {
                SortDir::Asc => ordering,
                SortDir::Desc => ordering.reverse(),
            }
        });
        rows = keyed
            .into_iter()
            .map(|(key, row)| {
                key.deref(&mut ctx.thread.sink());
                row
            })
            .collect();
    }

    let mut last = Value::Nothing;
    for row in rows {
        last.deref(&mut ctx.thread.sink());
        bind_row(ctx, q.row_lvid, row);
        last = match q.body.eval(ctx) {
            Unwind::Normal(v) => v,
            other => return other,
        };
        if ctx.has_event() {
            last.deref(&mut ctx.thread.sink());
            return Unwind::Normal(Value::Nothing);
        }
    }
    Unwind::Normal(last)
}

fn eval_summarize(q: &SummarizeQuery, ctx: &EvalCtx<'_>) -> Unwind {
    let Some(source_val) = eval_node(&q.source, ctx) else {
        return Unwind::Normal(Value::Nothing);
    };
    let rows = context_rows(&source_val);
    source_val.deref(&mut ctx.thread.sink());

    let mut keyed: Vec<(String, Value)> = Vec::with_capacity(rows.len());
    for row in rows {
        bind_row(ctx, q.row_lvid, row.clone());
        let key = eval_node(&q.key, ctx).unwrap_or(Value::Nothing).get_as_string();
        keyed.push((key, row));
    }

    let mut results = Vec::new();
    let mut index = 0;
    while index < keyed.len() {
        let group_key = keyed[index].0.clone();
        let mut group = Vec::new();
        while index < keyed.len() && keyed[index].0 == group_key {
            group.push(keyed[index].1.clone());
            index += 1;
        }
        let first_row = group.first().cloned().unwrap_or(Value::Nothing);
        bind_row(ctx, q.row_lvid, first_row);
        bind_row(ctx, q.group_lvid, Value::list(group));
        let outcome = match q.body.eval(ctx) {
            Unwind::Normal(v) => v,
            other => {
                for (_, row) in keyed {
                    row.deref(&mut ctx.thread.sink());
                }
                return other;
            }
        };
        if ctx.has_event() {
            outcome.deref(&mut ctx.thread.sink());
            for (_, row) in keyed {
                row.deref(&mut ctx.thread.sink());
            }
            return Unwind::Normal(Value::Nothing);
        }
        results.push(outcome);
    }
    for (_, row) in keyed {
        row.deref(&mut ctx.thread.sink());
    }
    Unwind::Normal(Value::list(results))
}

fn compare_sort_keys(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::String(_), _) | (_, Value::String(_)) => a.get_as_string().cmp(&b.get_as_string()),
        _ => a
            .get_as_float()
            .partial_cmp(&b.get_as_float())
            .unwrap_or(std::cmp::Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use crate::frame::Frame;
    use crate::operators::BinOp;
    use crate::program::Program;
    use std::sync::Arc;

    fn run(query: ContextQuery, local_count: usize) -> Value {
        let handle = vellum_threads::ThreadContext::attach();
        let thread = handle.context();
        let frame = Frame::new(local_count);
        let program = Arc::new(Program::new());
        let ctx = EvalCtx { frame: &frame, thread: &thread, program: &program };
        query.eval(&ctx).into_value()
    }

    fn sample_rows() -> Node {
        let mut row1 = QHash::new();
        row1.insert("name", Value::string("a"));
        row1.insert("score", Value::Int(3));
        let mut row2 = QHash::new();
        row2.insert("name", Value::string("b"));
        row2.insert("score", Value::Int(1));
        Node::Literal(Value::list(vec![Value::hash(row1), Value::hash(row2)]))
    }

    #[test]
    fn test_find_projects_matching_rows() {
        let query = ContextQuery::Find(FindQuery {
            source: Box::new(sample_rows()),
            row_lvid: 0,
            predicate: Box::new(Node::Binary {
                op: BinOp::Gt,
                left: Box::new(Node::Index {
                    base: Box::new(Node::Local(0)),
                    index: Box::new(Node::Literal(Value::string("score"))),
                }),
                right: Box::new(Node::Literal(Value::Int(2))),
            }),
            columns: vec!["name".to_string()],
        });
        let result = run(query, 1);
        match result {
            Value::List(l) => assert_eq!(l.with(|l| l.len()), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_context_iterate_sorts_stably_ascending() {
        let query = ContextQuery::Iterate(ContextIterate {
            source: Box::new(sample_rows()),
            row_lvid: 0,
            predicate: None,
            sort_key: Some((
                Box::new(Node::Index {
                    base: Box::new(Node::Local(0)),
                    index: Box::new(Node::Literal(Value::string("score"))),
                }),
                SortDir::Asc,
            )),
            body: Box::new(Node::Index {
                base: Box::new(Node::Local(0)),
                index: Box::new(Node::Literal(Value::string("name"))),
            }),
        });
        let result = run(query, 1);
        assert_eq!(result.get_as_string(), "a");
    }

    #[test]
    fn test_summarize_groups_adjacent_rows() {
        let query = ContextQuery::Summarize(SummarizeQuery {
            source: Box::new(sample_rows()),
            row_lvid: 0,
            group_lvid: 1,
            key: Box::new(Node::Literal(Value::string("all"))),
            body: Box::new(Node::Local(1)),
        });
        let result = run(query, 2);
        match result {
            Value::List(l) => assert_eq!(l.with(|l| l.len()), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }
}
