//! Abstract evaluation of statements and expressions.
//!
//! Evaluation never executes anything: it walks a chunk binding types
//! into scopes, invoking function models abstractly, and collecting the
//! union of every `return` a block can reach. Unresolvable expressions
//! yield `None` and the analysis degrades instead of failing.

use crate::annotation;
use crate::diagnostics::DiagnosticSink;
use crate::func::FnModel;
use crate::scope::Scope;
use crate::session::Session;
use lunar_syntax::{
    BinOp, Block, CommentMap, Expr, ExprKind, NodeId, Span, Stat, StatKind, TableField, UnOp,
};
use lunar_types::{basic_type, union_types, BasicType, Origin, Ty, Type, TypeKind};
use std::path::PathBuf;
use std::rc::Rc;

/// Everything evaluation needs besides the scope: the owning session,
/// the file being analyzed and its comment index.
#[derive(Clone)]
pub struct EvalCtx {
    /// Owning analysis session
    pub session: Session,
    /// File under evaluation
    pub file: PathBuf,
    /// Doc-comment index for the file
    pub comments: Rc<CommentMap>,
    /// Diagnostics sink for this file, when a check pass is running.
    ///
    /// Scoped to the file: modules resolved during the pass evaluate
    /// under their own context without a sink, so dependency findings
    /// never land in the checked file's report.
    pub lints: Option<Rc<DiagnosticSink>>,
}

impl EvalCtx {
    /// Register `@Name`-style project types declared in this file's
    /// comments. A custom type is any annotation whose target name starts
    /// with an uppercase letter.
    pub fn register_declared_types(&self, scope: &Rc<Scope>) {
        for (_, anns) in self.comments.lines() {
            for ann in anns {
                let is_type_name = ann
                    .name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase());
                if !is_type_name || ann.value.is_empty() {
                    continue;
                }
                if self.session.custom_type(&ann.name).is_some() {
                    continue;
                }
                if let Some(t) = annotation::load_type(&ann.value, scope, self) {
                    self.session.register_type(ann.name.clone(), t);
                }
            }
        }
    }

    fn origin(&self, span: Span) -> Origin {
        Origin {
            file: self.file.clone(),
            line: span.start_line,
            column: span.start_column,
        }
    }
}

/// Evaluate a block, producing the union of every reachable `return`.
pub fn eval_block(block: &Block, scope: &Rc<Scope>, ctx: &EvalCtx) -> Option<Ty> {
    let mut returns: Vec<Option<Ty>> = Vec::new();
    exec_block(block, scope, ctx, &mut returns);
    let mut present = returns.into_iter().flatten().map(Some).collect::<Vec<_>>();
    match present.len() {
        0 => None,
        1 => present.pop().flatten(),
        _ => Some(union_types(&present)),
    }
}

fn exec_block(block: &Block, scope: &Rc<Scope>, ctx: &EvalCtx, returns: &mut Vec<Option<Ty>>) {
    for stat in &block.stats {
        exec_stat(stat, scope, ctx, returns);
    }
}

fn exec_stat(stat: &Stat, scope: &Rc<Scope>, ctx: &EvalCtx, returns: &mut Vec<Option<Ty>>) {
    match &stat.kind {
        StatKind::Local { names, exprs } => {
            let values: Vec<Option<Ty>> =
                exprs.iter().map(|e| eval_expr(e, scope, ctx)).collect();
            let line = stat.span.start_line;
            for (i, name) in names.iter().enumerate() {
                let mut value = values.get(i).cloned().flatten();
                value = apply_annotations(name, value, line, names.len() == 1, stat.id, stat.span, scope, ctx);
                if let Some(declared) = scope.get(&format!("$type_{}", name)) {
                    check_vtype(&declared, value.as_ref(), stat.id, stat.span, ctx);
                    value = Some(declared);
                }
                scope.bind_at(name.clone(), value, Some(ctx.origin(stat.span)));
            }
        }

        StatKind::Assign { targets, exprs } => {
            let values: Vec<Option<Ty>> =
                exprs.iter().map(|e| eval_expr(e, scope, ctx)).collect();
            for (i, target) in targets.iter().enumerate() {
                let value = values.get(i).cloned().flatten();
                assign_target(target, value, scope, ctx);
            }
        }

        StatKind::FunctionDecl { name, func, local } => {
            let display = match &name.method {
                Some(m) => format!("{}:{}", name.path.join("."), m),
                None => name.path.join("."),
            };
            // `function t:m()` takes an implicit self parameter.
            let decl = if name.method.is_some() {
                let mut f = func.clone();
                f.params.insert(0, "self".to_string());
                Rc::new(f)
            } else {
                Rc::new(func.clone())
            };
            let ty = FnModel::build(display, decl, scope, ctx);
            ty.set_origin(ctx.origin(stat.span));

            let key = name.method.as_deref().or(name.path.last().map(String::as_str));
            if name.path.len() == 1 && name.method.is_none() {
                if *local {
                    scope.bind(name.path[0].clone(), Some(ty));
                } else {
                    scope.assign(&name.path[0], Some(ty));
                }
            } else if let (Some(owner), Some(key)) = (owner_of(name, scope), key) {
                if !owner.readonly {
                    owner.set_field(key, ty);
                }
            }
        }

        StatKind::Return(exprs) => {
            // Trailing return values still get walked so member accesses
            // inside them are checked.
            let mut value = None;
            for (i, e) in exprs.iter().enumerate() {
                let t = eval_expr(e, scope, ctx);
                if i == 0 {
                    value = t;
                }
            }
            returns.push(value);
        }

        StatKind::If { arms, orelse } => {
            for (cond, body) in arms {
                eval_expr(cond, scope, ctx);
                exec_block(body, &Scope::child(scope), ctx, returns);
            }
            if let Some(body) = orelse {
                exec_block(body, &Scope::child(scope), ctx, returns);
            }
        }

        StatKind::While { cond, body } => {
            eval_expr(cond, scope, ctx);
            exec_block(body, &Scope::child(scope), ctx, returns);
        }

        StatKind::Repeat { body, cond } => {
            let inner = Scope::child(scope);
            exec_block(body, &inner, ctx, returns);
            eval_expr(cond, &inner, ctx);
        }

        StatKind::NumericFor {
            var,
            start,
            limit,
            step,
            body,
        } => {
            eval_expr(start, scope, ctx);
            eval_expr(limit, scope, ctx);
            if let Some(step) = step {
                eval_expr(step, scope, ctx);
            }
            let inner = Scope::child(scope);
            inner.bind(var.clone(), basic_type("number"));
            exec_block(body, &inner, ctx, returns);
        }

        StatKind::GenericFor { names, exprs, body } => {
            let inner = Scope::child(scope);
            bind_iteration(names, exprs, &inner, ctx);
            exec_block(body, &inner, ctx, returns);
        }

        StatKind::Do(body) => {
            exec_block(body, &Scope::child(scope), ctx, returns);
        }

        StatKind::ExprStat(expr) => {
            eval_expr(expr, scope, ctx);
        }

        StatKind::Break | StatKind::Goto(_) | StatKind::Label(_) => {}
    }
}

/// Doc annotation or inline `-->` marker on a declaration line.
#[allow(clippy::too_many_arguments)]
fn apply_annotations(
    name: &str,
    value: Option<Ty>,
    line: u32,
    single: bool,
    node: NodeId,
    span: Span,
    scope: &Rc<Scope>,
    ctx: &EvalCtx,
) -> Option<Ty> {
    if let Some(ann) = ctx
        .comments
        .annotations(line)
        .iter()
        .find(|a| a.name == name)
    {
        if let Some(declared) = annotation::load_type(&ann.value, scope, ctx) {
            check_vtype(&declared, value.as_ref(), node, span, ctx);
            return Some(declared);
        }
    } else if single {
        if let Some(marker) = ctx.comments.inline_type(line) {
            if let Some(declared) = annotation::load_type(marker, scope, ctx) {
                return Some(declared);
            }
        }
    }
    value
}

fn assign_target(target: &Expr, value: Option<Ty>, scope: &Rc<Scope>, ctx: &EvalCtx) {
    match &target.kind {
        ExprKind::Name(n) => {
            if let Some(declared) = scope.get(&format!("$type_{}", n)) {
                check_vtype(&declared, value.as_ref(), target.id, target.span, ctx);
            }
            scope.assign(n, value);
        }
        ExprKind::Member { base, name } => {
            if let Some(bt) = eval_expr(base, scope, ctx) {
                if !bt.readonly {
                    bt.set_field(name.clone(), value.unwrap_or_else(Type::any));
                }
            }
        }
        ExprKind::Index { base, index } => {
            if let Some(bt) = eval_expr(base, scope, ctx) {
                if bt.readonly {
                    return;
                }
                match &index.kind {
                    ExprKind::Str(key) => {
                        bt.set_field(key.clone(), value.unwrap_or_else(Type::any));
                    }
                    _ => {
                        if value.is_some() {
                            let merged = union_types(&[bt.element(), value]);
                            *bt.element.borrow_mut() = Some(merged);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Resolve the table that owns a dotted function name, e.g. the `M.util`
/// in `function M.util.run()`.
fn owner_of(name: &lunar_syntax::FuncName, scope: &Rc<Scope>) -> Option<Ty> {
    let mut t = scope.get(&name.path[0])?;
    let stop = if name.method.is_some() {
        name.path.len()
    } else {
        name.path.len() - 1
    };
    for k in &name.path[1..stop] {
        t = t.member(k)?;
    }
    Some(t)
}

fn bind_iteration(names: &[String], exprs: &[Expr], scope: &Rc<Scope>, ctx: &EvalCtx) {
    let mut key: Option<Ty> = None;
    let mut value: Option<Ty> = None;

    if let Some(Expr {
        kind: ExprKind::Call { base, args, .. },
        ..
    }) = exprs.first()
    {
        if let ExprKind::Name(f) = &base.kind {
            let subject = args.first().and_then(|a| eval_expr(a, scope, ctx));
            match f.as_str() {
                "ipairs" => {
                    key = basic_type("number");
                    value = subject.and_then(|t| t.element().or_else(|| t.field("*")));
                }
                "pairs" => {
                    key = basic_type("string");
                    value = subject.and_then(|t| t.field("*").or_else(|| t.element()));
                }
                _ => {
                    for a in args {
                        eval_expr(a, scope, ctx);
                    }
                }
            }
        }
    }

    for (i, name) in names.iter().enumerate() {
        let t = match i {
            0 => key.clone(),
            1 => value.clone(),
            _ => None,
        };
        scope.bind(name.clone(), t);
    }
}

/// Evaluate an expression to its inferred type.
pub fn eval_expr(expr: &Expr, scope: &Rc<Scope>, ctx: &EvalCtx) -> Option<Ty> {
    match &expr.kind {
        ExprKind::Nil => basic_type("nil"),
        ExprKind::True | ExprKind::False => basic_type("boolean"),
        ExprKind::Number(_) => basic_type("number"),
        ExprKind::Str(_) => basic_type("string"),
        ExprKind::Vararg => Some(Type::any()),
        ExprKind::Name(n) => scope.get(n),
        ExprKind::Paren(inner) => eval_expr(inner, scope, ctx),

        ExprKind::Function(decl) => {
            let ty = FnModel::build("", Rc::new(decl.clone()), scope, ctx);
            ty.set_origin(ctx.origin(expr.span));
            Some(ty)
        }

        ExprKind::Table(fields) => Some(eval_table(fields, expr.span, scope, ctx)),

        ExprKind::Member { base, name } => {
            let bt = eval_expr(base, scope, ctx)?;
            member_type(&bt, name, expr.id, expr.span, ctx)
        }

        ExprKind::Index { base, index } => {
            let bt = eval_expr(base, scope, ctx)?;
            if bt.is_any() {
                return Some(Type::any());
            }
            match &index.kind {
                ExprKind::Str(key) => bt
                    .field(key)
                    .or_else(|| bt.field("*"))
                    .or_else(|| bt.element()),
                ExprKind::Number(n) => bt
                    .field(&format_index(*n))
                    .or_else(|| bt.element())
                    .or_else(|| bt.field("*")),
                _ => {
                    eval_expr(index, scope, ctx);
                    bt.element().or_else(|| bt.field("*"))
                }
            }
        }

        ExprKind::Call { base, method, args } => eval_call(expr, base, method.as_deref(), args, scope, ctx),

        ExprKind::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs, scope, ctx);
            let r = eval_expr(rhs, scope, ctx);
            match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                    basic_type("number")
                }
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                    basic_type("boolean")
                }
                BinOp::Concat => basic_type("string"),
                BinOp::And => r,
                BinOp::Or => match (l, r) {
                    (Some(l), Some(r)) => Some(union_types(&[Some(l), Some(r)])),
                    (l, r) => l.or(r),
                },
            }
        }

        ExprKind::Unary { op, expr: operand } => {
            eval_expr(operand, scope, ctx);
            match op {
                UnOp::Not => basic_type("boolean"),
                UnOp::Len => basic_type("number"),
                UnOp::Neg => basic_type("number"),
            }
        }
    }
}

fn eval_table(fields: &[TableField], span: Span, scope: &Rc<Scope>, ctx: &EvalCtx) -> Ty {
    let t = Type::table();
    t.set_origin(ctx.origin(span));

    for field in fields {
        match field {
            TableField::Named(name, value_expr) => {
                let value = eval_expr(value_expr, scope, ctx);
                let value = apply_annotations(
                    name,
                    value,
                    value_expr.span.start_line,
                    true,
                    value_expr.id,
                    value_expr.span,
                    scope,
                    ctx,
                );
                t.set_field(name.clone(), value.unwrap_or_else(Type::any));
            }
            TableField::Keyed(key, value_expr) => {
                let value = eval_expr(value_expr, scope, ctx);
                match &key.kind {
                    ExprKind::Str(k) => {
                        t.set_field(k.clone(), value.unwrap_or_else(Type::any));
                    }
                    _ => {
                        eval_expr(key, scope, ctx);
                        if value.is_some() {
                            let merged = union_types(&[t.element(), value]);
                            *t.element.borrow_mut() = Some(merged);
                        }
                    }
                }
            }
            TableField::Item(value_expr) => {
                if let Some(value) = eval_expr(value_expr, scope, ctx) {
                    let merged = union_types(&[t.element(), Some(value)]);
                    *t.element.borrow_mut() = Some(merged);
                }
            }
        }
    }
    t
}

fn member_type(bt: &Ty, name: &str, node: NodeId, span: Span, ctx: &EvalCtx) -> Option<Ty> {
    if bt.is_any() {
        return Some(Type::any());
    }
    // Methods and fields of string values live in the string library.
    if bt.kind == TypeKind::Basic(BasicType::String) {
        if let Some(lib) = ctx.session.globals().get("string") {
            if let Some(t) = lib.member(name) {
                return Some(t);
            }
        }
    }
    if let Some(t) = bt.member(name) {
        return Some(t);
    }
    if bt.readonly && !name.starts_with('_') {
        if let Some(sink) = &ctx.lints {
            sink.report(
                node,
                span,
                format!("member \"{}\" does not exist or is not declared", name),
            );
        }
    }
    None
}

fn eval_call(
    expr: &Expr,
    base: &Expr,
    method: Option<&str>,
    args: &[Expr],
    scope: &Rc<Scope>,
    ctx: &EvalCtx,
) -> Option<Ty> {
    // Module loading is resolved here, where the literal name is visible.
    if method.is_none() {
        if let ExprKind::Name(f) = &base.kind {
            if f == "require" || f == "_load" {
                if let Some(Expr {
                    kind: ExprKind::Str(modname),
                    ..
                }) = args.first()
                {
                    return ctx.session.resolve(modname, Some(&ctx.file));
                }
            }
        }
    }

    let mut arg_types: Vec<Option<Ty>> = Vec::new();
    let callee = match method {
        Some(m) => {
            let recv = eval_expr(base, scope, ctx)?;
            let f = member_type(&recv, m, expr.id, expr.span, ctx)?;
            arg_types.push(Some(recv));
            f
        }
        None => eval_expr(base, scope, ctx)?,
    };
    for a in args {
        arg_types.push(eval_expr(a, scope, ctx));
    }

    let call = callee.call.as_ref()?;
    // Declared parameter types vs supplied argument types.
    for (i, at) in arg_types.iter().enumerate() {
        if let (Some(pt), Some(arg_expr)) = (call.param_type(i), call_arg_expr(method, args, i)) {
            check_vtype(&pt, at.as_ref(), arg_expr.id, arg_expr.span, ctx);
        }
    }
    call.invoke(&arg_types)
}

/// The source expression for positional argument `i`, accounting for the
/// implicit receiver of method calls.
fn call_arg_expr<'a>(method: Option<&str>, args: &'a [Expr], i: usize) -> Option<&'a Expr> {
    if method.is_some() {
        if i == 0 {
            return None;
        }
        args.get(i - 1)
    } else {
        args.get(i)
    }
}

fn format_index(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Assignment-compatibility check between a declared and an actual type.
///
/// Reports at most once per node. `any` on either side passes, and union
/// members pass when any runtime kind is shared.
pub fn check_vtype(declared: &Ty, value: Option<&Ty>, node: NodeId, span: Span, ctx: &EvalCtx) {
    let Some(sink) = ctx.lints.as_ref() else {
        return;
    };
    let Some(value) = value else { return };
    if Rc::ptr_eq(declared, value) || sink.is_reported(node) {
        return;
    }
    if declared.name == value.name {
        return;
    }
    if declared.is_any() || value.is_any() {
        return;
    }

    let message = format!(
        "cannot assign type \"{}\" to type \"{}\"",
        value.name, declared.name
    );
    if declared.is_never() || value.is_never() {
        sink.report(node, span, message);
        return;
    }

    let declared_kinds = runtime_kinds(declared);
    let value_kinds = runtime_kinds(value);
    if declared_kinds
        .iter()
        .any(|k| *k == "any" || value_kinds.contains(k))
    {
        return;
    }
    if value_kinds.iter().any(|k| *k == "any") {
        return;
    }
    sink.report(node, span, message);
}

fn runtime_kinds(t: &Ty) -> Vec<&'static str> {
    if t.variants.is_empty() {
        vec![t.kind_name()]
    } else {
        t.variants.iter().map(|v| v.kind_name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use lunar_syntax::parse;

    fn eval_src(src: &str) -> (Option<Ty>, Rc<Scope>, EvalCtx) {
        let chunk = parse(src).unwrap();
        let session = Session::new("/tmp/lunar-eval-tests");
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: None,
        };
        let r = eval_block(&chunk.body, &scope, &ctx);
        (r, scope, ctx)
    }

    fn lint_src(src: &str) -> Vec<crate::diagnostics::Diagnostic> {
        let chunk = parse(src).unwrap();
        let session = Session::new("/tmp/lunar-eval-tests");
        let sink = Rc::new(DiagnosticSink::new());
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: Some(sink.clone()),
        };
        eval_block(&chunk.body, &scope, &ctx);
        sink.take()
    }

    #[test]
    fn test_local_literal_types() {
        let (_, scope, _) = eval_src("local a = 1\nlocal b = \"s\"\nlocal c = true\nlocal d = nil");
        assert_eq!(scope.get("a").unwrap().name(), "number");
        assert_eq!(scope.get("b").unwrap().name(), "string");
        assert_eq!(scope.get("c").unwrap().name(), "boolean");
        assert_eq!(scope.get("d").unwrap().name(), "nil");
    }

    #[test]
    fn test_local_annotation_wins() {
        let (_, scope, _) = eval_src("local v = {} -- @v map<string>");
        assert_eq!(scope.get("v").unwrap().name(), "map<string>");
    }

    #[test]
    fn test_inline_marker() {
        let (_, scope, _) = eval_src("local v = load_conf() --> map<number>");
        assert_eq!(scope.get("v").unwrap().name(), "map<number>");
    }

    #[test]
    fn test_table_constructor_fields() {
        let (_, scope, _) = eval_src("local t = { x = 1, name = \"n\", [\"k\"] = true }");
        let t = scope.get("t").unwrap();
        assert_eq!(t.field("x").unwrap().name(), "number");
        assert_eq!(t.field("name").unwrap().name(), "string");
        assert_eq!(t.field("k").unwrap().name(), "boolean");
    }

    #[test]
    fn test_table_items_union_into_element() {
        let (_, scope, _) = eval_src("local t = { 1, 2, \"three\" }");
        let t = scope.get("t").unwrap();
        let e = t.element().unwrap();
        assert_eq!(e.variants.len(), 2);
    }

    #[test]
    fn test_member_chain_and_assignment() {
        let (_, scope, _) = eval_src("local t = {}\nt.x = 10\nlocal y = t.x");
        assert_eq!(scope.get("y").unwrap().name(), "number");
    }

    #[test]
    fn test_function_decl_and_call() {
        let (_, scope, _) = eval_src(
            "local function add(a, b)\nreturn a + b\nend\nlocal r = add(1, 2)",
        );
        assert_eq!(scope.get("r").unwrap().name(), "number");
    }

    #[test]
    fn test_method_decl_binds_on_table() {
        let (_, scope, _) = eval_src(
            "local M = {}\nfunction M.get()\nreturn 1\nend\nlocal r = M.get()",
        );
        assert_eq!(scope.get("r").unwrap().name(), "number");
    }

    #[test]
    fn test_return_union_of_branches() {
        let (r, _, _) = eval_src(
            "local function f(x)\nif x then\nreturn 1\nelse\nreturn \"s\"\nend\nend\nreturn f(true)",
        );
        let r = r.unwrap();
        assert_eq!(r.variants.len(), 2);
    }

    #[test]
    fn test_generic_for_bindings() {
        let (_, scope, _) = eval_src(
            "local src = { 1, 2, 3 }\nlocal out\nfor i, v in ipairs(src) do\nout = v\nend",
        );
        assert_eq!(scope.get("out").unwrap().name(), "number");
    }

    #[test]
    fn test_operators() {
        let (_, scope, _) = eval_src(
            "local a = 1 + 2\nlocal b = \"x\" .. \"y\"\nlocal c = 1 < 2\nlocal d = #\"s\"",
        );
        assert_eq!(scope.get("a").unwrap().name(), "number");
        assert_eq!(scope.get("b").unwrap().name(), "string");
        assert_eq!(scope.get("c").unwrap().name(), "boolean");
        assert_eq!(scope.get("d").unwrap().name(), "number");
    }

    #[test]
    fn test_or_unions_operands() {
        let (_, scope, _) = eval_src("local v = 1 or \"fallback\"");
        assert_eq!(scope.get("v").unwrap().variants.len(), 2);
    }

    #[test]
    fn test_missing_member_on_declared_shape_lints() {
        let items = lint_src("local p = {} -- @p {x: number}\nlocal v = p.missing");
        assert_eq!(items.len(), 1);
        assert!(items[0].message.contains("missing"));
    }

    #[test]
    fn test_annotation_mismatch_lints() {
        let items = lint_src("local n = \"text\" -- @n number");
        assert_eq!(items.len(), 1);
        assert!(items[0].message.contains("cannot assign"));
    }

    #[test]
    fn test_underscore_members_never_lint() {
        let items = lint_src("local p = {} -- @p {x: number}\nlocal v = p._private");
        assert!(items.is_empty());
    }

    #[test]
    fn test_trailing_return_values_are_checked() {
        let items = lint_src(
            "local p = {} -- @p {x: number}\nreturn p.x, p.typo",
        );
        assert_eq!(items.len(), 1);
        assert!(items[0].message.contains("typo"));
    }

    #[test]
    fn test_return_type_is_first_value() {
        let (r, _, _) = eval_src("return 1, \"detail\"");
        assert_eq!(r.unwrap().name(), "number");
    }
}
