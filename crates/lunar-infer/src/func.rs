//! Abstract function model.
//!
//! A function value is a [`Callable`] that binds parameter types by
//! priority (request override, annotation, constructor `self`, call-site
//! argument), then decides whether the body must actually be executed or
//! the annotated return type can be trusted. Bodies of recursive and
//! mutually-recursive functions terminate through the `Running` guard.

use crate::annotation::load_type;
use crate::eval::{self, EvalCtx};
use crate::scope::Scope;
use lunar_syntax::FunctionDecl;
use lunar_types::{Callable, Ty, Type};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// The model behind one `function ... end` declaration.
pub struct FnModel {
    name: String,
    decl: Rc<FunctionDecl>,
    scope: Rc<Scope>,
    ctx: EvalCtx,
    /// Doc-comment annotations covering the declaration, name to type text
    types: FxHashMap<String, String>,
    return_text: Option<String>,
    doc: String,
    constructor: bool,
    state: Cell<RunState>,
    /// Set after the first invocation of a nullary function; the result
    /// is then served from `result` without re-running the body.
    done_once: Cell<bool>,
    result: RefCell<Option<Ty>>,
    param_cache: RefCell<FxHashMap<usize, Option<Ty>>>,
    req_override: RefCell<Option<Ty>>,
    res_override: RefCell<Option<Ty>>,
}

impl FnModel {
    /// Model a declaration without wrapping it in a type.
    pub fn new(
        name: impl Into<String>,
        decl: Rc<FunctionDecl>,
        scope: &Rc<Scope>,
        ctx: &EvalCtx,
    ) -> Rc<FnModel> {
        let name = name.into();
        let span = decl.span;
        let mut types: FxHashMap<String, String> = FxHashMap::default();
        // The line above the declaration is included: annotation blocks
        // conventionally sit directly above the function they describe.
        for (ann_name, ann) in ctx
            .comments
            .annotations_in(span.start_line.saturating_sub(1), span.end_line)
        {
            if !ann.value.is_empty() {
                types.insert(ann_name, ann.value.clone());
            }
        }
        let return_text = types.get("return").cloned();
        let doc = render_doc(&name, &decl, &types, ctx, span.start_line);
        let constructor = types.contains_key("@@");

        Rc::new(FnModel {
            name,
            decl,
            scope: scope.clone(),
            ctx: ctx.clone(),
            types,
            return_text,
            doc,
            constructor,
            state: Cell::new(RunState::Idle),
            done_once: Cell::new(false),
            result: RefCell::new(None),
            param_cache: RefCell::new(FxHashMap::default()),
            req_override: RefCell::new(None),
            res_override: RefCell::new(None),
        })
    }

    /// Build the callable type for a declaration. Registers the enclosing
    /// constructor binding (`@@`) when the declaration carries that
    /// annotation.
    pub fn build(
        name: impl Into<String>,
        decl: Rc<FunctionDecl>,
        scope: &Rc<Scope>,
        ctx: &EvalCtx,
    ) -> Ty {
        let model = FnModel::new(name, decl, scope, ctx);
        let constructor = model.constructor;
        let doc = model.doc.clone();
        let ty = Type::callable(model);
        ty.set_doc(doc);
        if constructor {
            scope.bind("@@", Some(ty.clone()));
        }
        ty
    }

    /// Override the first parameter's type at every invocation.
    pub fn set_request_type(&self, ty: Option<Ty>) {
        *self.req_override.borrow_mut() = ty;
    }

    /// Override the return type, bypassing body execution when no
    /// diagnostics pass needs it.
    pub fn set_result_type(&self, ty: Option<Ty>) {
        *self.res_override.borrow_mut() = ty;
    }

    /// Declared name of the modeled function.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_self_constructor(&self, ctor: &Ty) -> bool {
        match &ctor.call {
            Some(c) => {
                Rc::as_ptr(c) as *const () == self as *const FnModel as *const ()
            }
            None => false,
        }
    }
}

impl Callable for FnModel {
    fn invoke(&self, args: &[Option<Ty>]) -> Option<Ty> {
        // Re-entrant call while the body is running: return the annotated
        // type (or the last result) instead of recursing.
        if self.state.get() == RunState::Running {
            if let Some(text) = &self.return_text {
                if let Some(t) = load_type(text, &self.scope, &self.ctx) {
                    *self.result.borrow_mut() = Some(t);
                }
            }
            return self.result.borrow().clone();
        }
        if self.done_once.get() {
            return self.result.borrow().clone();
        }
        // A function without parameters always resolves to the same
        // result; run it once.
        self.done_once.set(self.decl.params.is_empty());

        let scope = Scope::child(&self.scope);
        let res_override = self.res_override.borrow().clone();
        scope.bind("$type_return", res_override.clone());

        // Annotation-declared types first, so annotations may reference
        // each other.
        for (name, text) in &self.types {
            let t = load_type(text, &scope, &self.ctx);
            scope.bind(format!("$type_{}", name), t);
        }

        // Constructor-provided instance type for `self`.
        let mut self_ty = scope.get("self");
        if self_ty.is_none() {
            if let Some(ctor) = self.scope.get("@@") {
                if !self.is_self_constructor(&ctor) {
                    if let Some(c) = &ctor.call {
                        self_ty = c.invoke(&[]);
                        if let Some(t) = &self_ty {
                            scope.bind("self", Some(t.clone()));
                        }
                    }
                }
            }
        }

        let req_override = self.req_override.borrow().clone();
        for (i, param) in self.decl.params.iter().enumerate() {
            let value = if i == 0 && req_override.is_some() {
                req_override.clone()
            } else if let Some(text) = self.types.get(param) {
                load_type(text, &scope, &self.ctx)
            } else if param == "self" && self_ty.is_some() {
                self_ty.clone()
            } else {
                args.get(i).cloned().flatten()
            };
            scope.bind(param.clone(), value);
        }

        // The body only has to run when something can be learned from it:
        // live editing, an unknown return type, or an active diagnostics
        // pass that wants to see the member accesses inside.
        let need_to_run = self.ctx.session.live_edit()
            || (res_override.is_none() && self.return_text.is_none())
            || self.ctx.lints.is_some();

        if need_to_run {
            self.state.set(RunState::Running);
            let r = eval::eval_block(&self.decl.body, &scope, &self.ctx);
            self.state.set(RunState::Idle);
            *self.result.borrow_mut() = r;
        }

        if let Some(r) = res_override {
            *self.result.borrow_mut() = Some(r);
        } else if let Some(text) = &self.return_text {
            // The annotation may name a type or a parameter to return
            // as-is.
            if let Some(t) = load_type(text, &scope, &self.ctx).or_else(|| scope.get(text)) {
                *self.result.borrow_mut() = Some(t);
            }
        }
        self.result.borrow().clone()
    }

    fn param_type(&self, index: usize) -> Option<Ty> {
        if let Some(t) = self.param_cache.borrow().get(&index) {
            return t.clone();
        }
        let name = self.decl.params.get(index)?;
        let t = self
            .types
            .get(name)
            .and_then(|text| load_type(text, &self.scope, &self.ctx));
        self.param_cache.borrow_mut().insert(index, t.clone());
        t
    }

    fn doc(&self) -> String {
        self.doc.clone()
    }

    fn signature(&self) -> Option<String> {
        Some(format!("({})", self.decl.params.join(", ")))
    }
}

/// Hover documentation for a declaration, from its annotations and the
/// free-form comment on the line above.
fn render_doc(
    name: &str,
    decl: &FunctionDecl,
    types: &FxHashMap<String, String>,
    ctx: &EvalCtx,
    start_line: u32,
) -> String {
    let mut doc = format!("#### {} ({})", name, decl.params.join(", "));
    if let Some(desc) = ctx.comments.description(start_line.saturating_sub(1)) {
        doc.push_str("\n");
        doc.push_str(desc);
    }

    let mut params: Vec<String> = Vec::new();
    for p in &decl.params {
        if let Some(t) = types.get(p) {
            params.push(format!("* {} `< {} >`", p, t));
        }
    }
    if !params.is_empty() {
        doc.push_str("\n\nparameters:\n");
        doc.push_str(&params.join("\n"));
    }
    if let Some(ret) = types.get("return") {
        doc.push_str(&format!("\n\nreturns: `< {} >`", ret));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use lunar_syntax::{parse, CommentMap, StatKind};
    use std::path::PathBuf;

    fn model_from(src: &str) -> (Ty, EvalCtx) {
        model_with_lints(src, None)
    }

    fn model_with_lints(
        src: &str,
        lints: Option<Rc<crate::diagnostics::DiagnosticSink>>,
    ) -> (Ty, EvalCtx) {
        let chunk = parse(src).unwrap();
        let session = Session::new("/tmp/lunar-func-tests");
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints,
        };
        for stat in &chunk.body.stats {
            if let StatKind::FunctionDecl { name, func, .. } = &stat.kind {
                let ty = FnModel::build(
                    name.path.join("."),
                    Rc::new(func.clone()),
                    &scope,
                    &ctx,
                );
                // Bind under its own name so recursive bodies resolve.
                scope.bind(name.path.join("."), Some(ty.clone()));
                return (ty, ctx);
            }
        }
        panic!("no function declaration in {src:?}");
    }

    fn num() -> Option<Ty> {
        lunar_types::basic_type("number")
    }

    #[test]
    fn test_annotated_return_without_running() {
        let (f, _ctx) = model_from(
            "function add(a, b) -- @a number @b number @return number\n\
             return a + b\nend",
        );
        let c = f.call.as_ref().unwrap();
        assert_eq!(c.invoke(&[]).unwrap().name(), "number");
    }

    #[test]
    fn test_call_site_argument_binding() {
        let (f, _ctx) = model_from("function id(x)\nreturn x\nend");
        let c = f.call.as_ref().unwrap();
        let r = c.invoke(&[num()]).unwrap();
        assert_eq!(r.name(), "number");
    }

    #[test]
    fn test_annotation_beats_call_site() {
        let (f, _ctx) = model_from(
            "function f(x) -- @x string\nreturn x\nend",
        );
        let c = f.call.as_ref().unwrap();
        let r = c.invoke(&[num()]).unwrap();
        assert_eq!(r.name(), "string");
    }

    #[test]
    fn test_request_override_beats_annotation() {
        let chunk = parse("function f(x) -- @x string\nreturn x\nend").unwrap();
        let session = Session::new("/tmp/lunar-func-tests");
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: None,
        };
        let StatKind::FunctionDecl { func, .. } = &chunk.body.stats[0].kind else {
            panic!("expected function decl");
        };
        let model = FnModel::new("f", Rc::new(func.clone()), &scope, &ctx);
        model.set_request_type(lunar_types::basic_type("boolean"));
        let r = model.invoke(&[num()]).unwrap();
        assert_eq!(r.name(), "boolean");
    }

    #[test]
    fn test_recursive_function_terminates() {
        // No return annotation, so the body must run; the reentrant call
        // hits the Running guard instead of recursing forever.
        let (f, _ctx) = model_from("function loop(n)\nreturn loop(n)\nend");
        let c = f.call.as_ref().unwrap();
        assert!(c.invoke(&[num()]).is_none());
    }

    #[test]
    fn test_recursive_function_uses_annotation() {
        // An active sink forces the body to run the way a diagnostics
        // pass does.
        let (f, _ctx) = model_with_lints(
            "function fib(n) -- @n number @return number\nreturn fib(n - 1) + fib(n - 2)\nend",
            Some(Rc::new(crate::diagnostics::DiagnosticSink::new())),
        );
        let c = f.call.as_ref().unwrap();
        assert_eq!(c.invoke(&[num()]).unwrap().name(), "number");
    }

    #[test]
    fn test_nullary_memoized() {
        let (f, _ctx) = model_from("function make()\nreturn {}\nend");
        let c = f.call.as_ref().unwrap();
        let a = c.invoke(&[]).unwrap();
        let b = c.invoke(&[]).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_param_type_introspection_cached() {
        let (f, _ctx) = model_from(
            "function f(a, b) -- @a map<string> @b number\nreturn b\nend",
        );
        let c = f.call.as_ref().unwrap();
        assert_eq!(c.param_type(0).unwrap().name(), "map<string>");
        assert_eq!(c.param_type(1).unwrap().name(), "number");
        assert!(c.param_type(2).is_none());
        // Second lookup serves the cached value.
        let first = c.param_type(0).unwrap();
        let again = c.param_type(0).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_doc_rendering() {
        let (f, _ctx) = model_from(
            "-- adds two numbers\nfunction add(a, b) -- @a number @b number @return number\nreturn a + b\nend",
        );
        let c = f.call.as_ref().unwrap();
        let doc = c.doc();
        assert!(doc.contains("#### add (a, b)"));
        assert!(doc.contains("adds two numbers"));
        assert!(doc.contains("`< number >`"));
        assert_eq!(c.signature().as_deref(), Some("(a, b)"));
    }
}
