// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Program lifecycle: `create`/`parse`/`run`, and `Drop` for `destroy`.
//!
//! Building an AST from source text is the excluded lexer/parser's job (see
//! the workspace's scope note); [`Program::parse`] instead takes an
//! already-built [`Node`] — the shape a host's own parser is expected to
//! hand the core — and performs this crate's own parse-time contract on it:
//! restricted-construct enforcement against the program's [`ParseOptions`],
//! then [`Node::parse_init`]'s scope/type/const-fold pass. Function and
//! class *declarations* are likewise registered directly via
//! [`Program::define_function`]/[`Program::define_class`] rather than
//! parsed from text, for the same reason.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_eval::{
    call_function, construct_object, ClassDef, EvalCtx, Frame, FunctionDef, Node, ParseContext, ParseFlags, Program as EvalProgram, Scope,
    TypeInfo,
};
use vellum_threads::ThreadContext;
use vellum_value::Value;

use crate::config::RuntimeConfig;
use crate::logging;
use crate::parse_options::ParseOptions;
use crate::restricted;

/// One `program_parse`d unit of top-level code, callable by the label it
/// was parsed under.
#[derive(Debug)]
struct EntryPoint {
    body: Node,
    local_count: usize,
}

/// An embeddable program: its parse-option restrictions, the symbol tables
/// the evaluator dispatches function/method/`new` calls against, and the
/// top-level bodies registered under `parse`.
#[derive(Debug)]
pub struct Program {
    options: ParseOptions,
    config: RuntimeConfig,
    inner: Arc<EvalProgram>,
    entry_points: HashMap<String, EntryPoint>,
}

impl Program {
    /// `program_create`: allocates an empty program restricted by `options`,
    /// initializing process-wide logging on first call (idempotent — see
    /// [`logging::init`]).
    #[must_use]
    pub fn create(options: ParseOptions) -> Self {
        let config = RuntimeConfig::from_env();
        logging::init(config.log_filter());
        tracing::debug!(?options, "program created");
        Self {
            options,
            config,
            inner: Arc::new(EvalProgram::new()),
            entry_points: HashMap::new(),
        }
    }

    /// Creates a child program whose effective option set is this program's
    /// options combined with `requested`, per [`ParseOptions::child`] — a
    /// child cannot relax a restriction its parent set unless the parent
    /// cleared `no-child-restrictions`.
    #[must_use]
    pub fn create_child(&self, requested: ParseOptions) -> Self {
        Self::create(self.options.child(requested))
    }

    #[must_use]
    pub fn options(&self) -> ParseOptions {
        self.options
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registers a free function's definition. Returns an error if the
    /// program has already started running a `background` expression (the
    /// only thing that clones the inner symbol-table handle), since
    /// definitions are meant to be complete before execution begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the program's symbol table is already shared
    /// with a running `background` thread.
    pub fn define_function(&mut self, def: FunctionDef) -> anyhow::Result<()> {
        Arc::get_mut(&mut self.inner)
            .ok_or_else(|| anyhow::anyhow!("cannot define '{}' after the program has started running", def.name))?
            .define_function(def);
        Ok(())
    }

    /// Registers a class's definition. See [`Program::define_function`] for
    /// the same post-start restriction.
    ///
    /// # Errors
    ///
    /// Returns an error if the program's symbol table is already shared
    /// with a running `background` thread.
    pub fn define_class(&mut self, def: ClassDef) -> anyhow::Result<()> {
        Arc::get_mut(&mut self.inner)
            .ok_or_else(|| anyhow::anyhow!("cannot define class '{}' after the program has started running", def.name))?
            .define_class(def);
        Ok(())
    }

    /// `program_parse`: structurally enforces this program's [`ParseOptions`]
    /// against `body`, runs its `parse_init` pass, and stores the result
    /// under `label` for a later [`Program::run`].
    ///
    /// # Errors
    ///
    /// Returns an error naming the violated option if `body` contains a
    /// construct this program's options forbid, or if `parse_init` itself
    /// rejects the tree (e.g. a bare local read inside `background`).
    pub fn parse(&mut self, body: Node, label: impl Into<String>) -> anyhow::Result<()> {
        let label = label.into();
        if let Some((option, description)) = restricted::scan(&body, self.options) {
            anyhow::bail!("parse option '{option}' violated while parsing '{label}': {description}");
        }
        let mut scope = Scope::new();
        let mut lvid_count = 0usize;
        let mut type_info = TypeInfo::new();
        let mut ctx = ParseContext {
            scope: &mut scope,
            flags: ParseFlags { top_level: true, ..ParseFlags::default() },
            lvid_count: &mut lvid_count,
            type_info: &mut type_info,
        };
        let body = body.parse_init(&mut ctx)?;
        tracing::debug!(%label, locals = lvid_count, "program parsed");
        self.entry_points.insert(label, EntryPoint { body, local_count: lvid_count });
        Ok(())
    }

    /// `program_run`: evaluates the entry point named `entry_point` — either
    /// a `parse`d top-level body or a `define_function`-registered free
    /// function — on the calling thread, binding `args` as that activation's
    /// implicit arguments (`$1`, `$2`, ...) for a top-level body, or as
    /// positional parameters for a function call.
    ///
    /// Attaches the calling OS thread if it has not already called
    /// [`ThreadContext::attach`] (nested attachment is a cheap no-op on a
    /// thread that already has); per spec §6, a host thread that means to
    /// keep calling into the runtime should attach explicitly so its
    /// resources outlive a single `run` call.
    ///
    /// Returns `Value::Nothing` and leaves an exception pending on the
    /// calling thread's sink (inspect via
    /// [`crate::ExceptionReport::from_sink`]) if `entry_point` doesn't name
    /// anything registered, or if evaluation itself raised.
    pub fn run(&self, entry_point: &str, args: Vec<Value>) -> Value {
        let handle = ThreadContext::attach();
        let thread = handle.context();

        if let Some(def) = self.inner.function(entry_point) {
            let frame = Frame::new(0);
            let ctx = EvalCtx::new(&frame, &thread, &self.inner);
            return call_function(&def, args, None, &ctx);
        }

        let Some(entry) = self.entry_points.get(entry_point) else {
            thread.sink().raise_system(
                vellum_exceptions::ErrorKind::InvalidOperation,
                format!("no such entry point '{entry_point}'"),
            );
            for arg in args {
                arg.deref(&mut thread.sink());
            }
            return Value::Nothing;
        };

        thread.set_implicit_args(args);
        let frame = Frame::new(entry.local_count);
        let ctx = EvalCtx::new(&frame, &thread, &self.inner);
        let result = entry.body.eval(&ctx).into_value();
        let mut sink = thread.sink();
        if sink.is_event() {
            result.deref(&mut sink);
            return Value::Nothing;
        }
        result
    }

    /// Constructs an instance of `class_name` via `new`, for host code that
    /// wants to build an object without writing a `New` node.
    #[must_use]
    pub fn construct(&self, class_name: &str, args: Vec<Value>) -> Value {
        let handle = ThreadContext::attach();
        let thread = handle.context();
        let frame = Frame::new(0);
        let ctx = EvalCtx::new(&frame, &thread, &self.inner);
        construct_object(Arc::clone(&self.inner), class_name, args, &ctx)
    }
}

impl Drop for Program {
    /// `program_destroy`: there is no explicit teardown beyond dropping the
    /// symbol tables and parsed bodies (every live value the program handed
    /// out already carries its own strong reference), but this is logged so
    /// the lifecycle is visible in a host's traces.
    fn drop(&mut self) {
        tracing::debug!("program destroyed");
    }
}

#[cfg(test)]
mod tests {
    use vellum_eval::BinOp;

    use super::*;

    fn local_program() -> Program {
        Program::create(ParseOptions::empty())
    }

    #[test]
    fn test_parse_and_run_simple_literal() {
        let mut program = local_program();
        program.parse(Node::Literal(Value::Int(42)), "main").unwrap();
        let value = program.run("main", vec![]);
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn test_parse_rejects_forbidden_construct() {
        let mut program = Program::create(ParseOptions::NO_NEW);
        let err = program.parse(Node::New { class_name: "Foo".into(), args: vec![] }, "main").unwrap_err();
        assert!(err.to_string().contains("no-new"));
    }

    #[test]
    fn test_run_unknown_entry_point_raises() {
        let program = local_program();
        let value = program.run("does-not-exist", vec![]);
        assert!(matches!(value, Value::Nothing));
    }

    #[test]
    fn test_run_registered_function_with_args() {
        let mut program = local_program();
        program
            .define_function(FunctionDef::new(
                "double",
                1,
                1,
                Node::Binary {
                    op: BinOp::Mul,
                    left: Box::new(Node::Local(0)),
                    right: Box::new(Node::Literal(Value::Int(2))),
                },
            ))
            .unwrap();
        let value = program.run("double", vec![Value::Int(21)]);
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn test_create_child_inherits_parent_restrictions() {
        let parent = Program::create(ParseOptions::NO_NEW);
        let child = parent.create_child(ParseOptions::NO_NETWORK);
        assert!(child.options().contains(ParseOptions::NO_NEW));
        assert!(child.options().contains(ParseOptions::NO_NETWORK));
    }

    #[test]
    fn test_define_function_after_parse_then_run_still_works() {
        let mut program = local_program();
        program
            .define_function(FunctionDef::new("answer", 0, 0, Node::Literal(Value::Int(7))))
            .unwrap();
        program.parse(Node::Literal(Value::Nothing), "top").unwrap();
        assert!(matches!(program.run("answer", vec![]), Value::Int(7)));
    }
}
