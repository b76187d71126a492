//! Annotation resolution: type expression text to type values.
//!
//! Annotation strings come from doc comments (`-- @a map<string>[]`),
//! inline markers (`--> @Order`) and builtin signature declarations. The
//! grammar is small but nests: a bracket pre-pass replaces every
//! top-level bracketed run with a `#T<n>` placeholder so the split
//! operators (`|`, `&`, `.`, trailing `[...]`) only ever apply at the
//! outermost level.

use crate::eval::EvalCtx;
use crate::scope::Scope;
use lunar_types::{
    arr_of, basic_type, map_of, merge_types, named_type, union_types, Ty, Type,
};
use rustc_hash::FxHashMap;
use std::rc::Rc;

const OPEN: [(char, char); 3] = [('(', ')'), ('{', '}'), ('<', '>')];

/// Replace bracketed runs with `#T<n>` placeholders, recording the
/// mapping. `<...>` runs are substituted only when their body contains a
/// top-level `|` or `&`; plain generics like `map<string>` stay inline.
pub fn parse_types(name: &str, map: &mut FxHashMap<String, String>) -> String {
    let name = name.trim();
    if !name.contains(['(', '{', '<']) {
        return name.to_string();
    }

    let mut out = String::new();
    let mut open = '\0';
    let mut close = '\0';
    let mut depth = 0u32;
    let mut start = 0usize;

    for (i, c) in name.char_indices() {
        if depth > 0 {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            if depth == 0 {
                let inner = name[start + open.len_utf8()..i].trim();
                let val = parse_types(inner, map);
                let key = format!("#T{}", map.len());

                if open == '<' {
                    if val.contains('&') || val.contains('|') {
                        map.insert(key.clone(), val);
                        out.push('<');
                        out.push_str(&key);
                        out.push('>');
                    } else {
                        out.push('<');
                        out.push_str(&val);
                        out.push('>');
                    }
                } else {
                    map.insert(key.clone(), format!("{}{}{}", open, val, close));
                    out.push_str(&key);
                }
            }
        } else if let Some(&(o, cl)) = OPEN.iter().find(|&&(o, _)| o == c) {
            open = o;
            close = cl;
            depth = 1;
            start = i;
        } else {
            out.push(c);
        }
    }

    out.trim().to_string()
}

/// Resolve an annotation string against a scope.
///
/// Never fails loudly: unresolvable input yields `None` and the caller
/// degrades to `any`.
pub fn load_type(name: &str, scope: &Rc<Scope>, ctx: &EvalCtx) -> Option<Ty> {
    // Trailing line comments are not part of the type.
    let name = match name.find("//") {
        Some(pos) => &name[..pos],
        None => name,
    };

    if let Some(t) = basic_type(name) {
        return Some(t);
    }

    let mut map = FxHashMap::default();
    let name = parse_types(name, &mut map);
    load_type_with(&name, scope, ctx, &map)
}

fn load_type_with(
    name: &str,
    scope: &Rc<Scope>,
    ctx: &EvalCtx,
    map: &FxHashMap<String, String>,
) -> Option<Ty> {
    let name = map.get(name).map(String::as_str).unwrap_or(name).trim();
    if name.is_empty() {
        return None;
    }

    if let Some(t) = basic_type(name) {
        return Some(t);
    }

    // ( T )
    if let Some(inner) = name.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        let t = load_type_with(inner, scope, ctx, map)?;
        if !t.name.contains(' ') {
            return Some(t);
        }
        let mut grouped = (*t).clone();
        grouped.name = format!("({})", t.name);
        return Some(Rc::new(grouped));
    }

    // { k1, k2: T2, k3?: T3 }
    if let Some(inner) = name.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let mut fields: FxHashMap<String, Ty> = FxHashMap::default();
        let mut labels: Vec<String> = Vec::new();
        for part in inner.split(',') {
            let (key, text) = match part.split_once(':') {
                Some((k, t)) => (k.trim(), t.trim()),
                None => (part.trim(), "string"),
            };
            let mut label = key.to_string();
            let key = key.trim_end_matches('?').trim();
            if key.is_empty() {
                continue;
            }
            let value = load_type_with(text, scope, ctx, map).unwrap_or_else(Type::any);
            if text != "string" {
                label = format!("{}: {}", label, value.name);
            }
            fields.insert(key.to_string(), value);
            labels.push(label);
        }
        return Some(Type::declared_table(
            format!("{{ {} }}", labels.join(", ")),
            fields,
        ));
    }

    // T1 | T2 | T3
    if name.contains('|') {
        let parts: Vec<Option<Ty>> = name
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| load_type_with(p, scope, ctx, map))
            .collect();
        return Some(union_types(&parts));
    }

    // T1 & T2 & T3
    if name.contains('&') {
        let parts: Vec<Option<Ty>> = name
            .split('&')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| load_type_with(p, scope, ctx, map))
            .collect();
        return Some(merge_types(&parts));
    }

    // map<T> or arr<T>
    if let Some(inner) = generic_body(name, "map") {
        let t = load_type_with(inner, scope, ctx, map)?;
        return Some(map_of(name, t));
    }
    if let Some(inner) = generic_body(name, "arr") {
        let t = load_type_with(inner, scope, ctx, map)?;
        return Some(arr_of(name, t));
    }

    // req<fn> or res<fn>: a function's first parameter / return type
    if let Some(inner) = generic_body(name, "req") {
        let inner = map.get(inner).map(String::as_str).unwrap_or(inner);
        let f = scope_path(inner, scope)?;
        let req = f
            .field("$req")
            .or_else(|| f.call.as_ref().and_then(|c| c.param_type(0)))?;
        return Some(named_type(name, req));
    }
    if let Some(inner) = generic_body(name, "res") {
        let inner = map.get(inner).map(String::as_str).unwrap_or(inner);
        let f = scope_path(inner, scope)?;
        let res = f
            .field("$res")
            .or_else(|| f.call.as_ref().and_then(|c| c.invoke(&[])))?;
        return Some(named_type(name, res));
    }

    // T[] or T[K]
    if let Some(open) = name.rfind('[') {
        if let Some(key) = name[open + 1..].strip_suffix(']') {
            let base = load_type_with(&name[..open], scope, ctx, map)?;
            let key = key.replace(['"', '\''], "");
            let key = key.trim();
            if key.is_empty() {
                return Some(arr_of(name, base));
            }
            let t = base
                .field(key)
                .or_else(|| base.field("*"))
                .or_else(|| base.element())
                .unwrap_or_else(Type::table);
            return Some(named_type(name, t));
        }
    }

    // T.K member path
    if name.contains('.') {
        let mut parts = name.split('.').map(str::trim);
        let first = parts.next()?;
        let mut t = load_type_with(first, scope, ctx, map)?;
        for k in parts {
            t = t.member(k)?;
        }
        return Some(named_type(name, t));
    }

    // @Name, $dao, or a bare identifier from the scope
    let plain = name.replace('@', "");
    let plain = plain.trim();
    if let Some(dao) = plain.strip_prefix('$') {
        let t = ctx.session.load_dao(dao, Some(&ctx.file))?;
        return Some(named_type(name, t));
    }
    let t = basic_type(plain)
        .or_else(|| ctx.session.custom_type(plain))
        .or_else(|| scope.get(plain))?;
    Some(named_type(name, t))
}

/// `prefix<body>` with optional interior whitespace; `None` otherwise.
fn generic_body<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?.trim_start();
    let body = rest.strip_prefix('<')?.strip_suffix('>')?;
    Some(body.trim())
}

/// Resolve a dotted value path (`dao.get`) against the scope.
fn scope_path(name: &str, scope: &Rc<Scope>) -> Option<Ty> {
    let name = name.replace(char::is_whitespace, "");
    let mut parts = name.split('.');
    let mut t = scope.get(parts.next()?)?;
    for k in parts {
        t = t.member(k)?;
    }
    Some(t)
}

/// Resolve a signature string (`"(a: number, b?: string)"`) into
/// positional parameter or return types.
pub fn gen_args(args: &str, scope: &Rc<Scope>, ctx: &EvalCtx, is_res: bool) -> Vec<Ty> {
    let mut args = args.replace(char::is_whitespace, "");
    if args.starts_with('(') && args.ends_with(')') {
        args = args[1..args.len() - 1].to_string();
    }
    if args.is_empty() {
        return Vec::new();
    }

    let mut map = FxHashMap::default();
    let args = parse_types(&args, &mut map);

    args.split(',')
        .map(|arg| {
            if let Some(t) = basic_type(arg).or_else(|| basic_type(&arg.replace('?', ""))) {
                return t;
            }

            let text = if arg == "..." {
                ""
            } else if let Some((_, t)) = arg.split_once(':') {
                t
            } else if let Some((_, d)) = arg.split_once('=') {
                match d.trim_end_matches('?') {
                    "true" | "false" => "boolean",
                    d if d.parse::<f64>().is_ok() => "number",
                    d => d,
                }
            } else if is_res {
                arg
            } else {
                ""
            };

            if text.is_empty() {
                return Type::any();
            }
            basic_type(text)
                .or_else(|| scope.get(text))
                .or_else(|| load_type_with(text, scope, ctx, &map))
                .unwrap_or_else(Type::any)
        })
        .collect()
}

/// First value of a return-signature string, if it resolves to something
/// more specific than `never`.
pub fn gen_value(args: &str, scope: &Rc<Scope>, ctx: &EvalCtx) -> Option<Ty> {
    if let Some(t) = basic_type(args).or_else(|| scope.get(args)) {
        return Some(t);
    }
    let first = gen_args(args, scope, ctx, true).into_iter().next()?;
    if first.is_never() {
        None
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use lunar_syntax::CommentMap;
    use std::path::PathBuf;

    fn ctx() -> (EvalCtx, Rc<Scope>) {
        let session = Session::new("/tmp/lunar-annotation-tests");
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&[])),
            lints: None,
        };
        (ctx, scope)
    }

    #[test]
    fn test_pre_pass_parens_and_braces() {
        let mut map = FxHashMap::default();
        let out = parse_types("(a | b) & {x: number}", &mut map);
        assert_eq!(out, "#T0 & #T1");
        assert_eq!(map["#T0"], "(a | b)");
        assert_eq!(map["#T1"], "{x: number}");
    }

    #[test]
    fn test_pre_pass_plain_generic_stays_inline() {
        let mut map = FxHashMap::default();
        let out = parse_types("map<string>[]", &mut map);
        assert_eq!(out, "map<string>[]");
        assert!(map.is_empty());
    }

    #[test]
    fn test_pre_pass_union_generic_gets_placeholder() {
        let mut map = FxHashMap::default();
        let out = parse_types("map<a|b>", &mut map);
        assert_eq!(out, "map<#T0>");
        assert_eq!(map["#T0"], "a|b");
    }

    #[test]
    fn test_basic_keyword() {
        let (ctx, scope) = ctx();
        assert_eq!(load_type("number", &scope, &ctx).unwrap().name(), "number");
        assert_eq!(load_type("integer", &scope, &ctx).unwrap().name(), "number");
    }

    #[test]
    fn test_map_of_string_array() {
        let (ctx, scope) = ctx();
        let t = load_type("map<string>[]", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "map<string>[]");
        let elem = t.element().unwrap();
        assert_eq!(elem.name(), "map<string>");
        assert_eq!(elem.member("anything").unwrap().name(), "string");
    }

    #[test]
    fn test_table_literal_shape() {
        let (ctx, scope) = ctx();
        let t = load_type("{x: number, y?: string}", &scope, &ctx).unwrap();
        assert_eq!(t.field("x").unwrap().name(), "number");
        assert_eq!(t.field("y").unwrap().name(), "string");
        assert!(t.name().contains("y?"));
        assert!(t.readonly);
    }

    #[test]
    fn test_untyped_table_field_defaults_to_string() {
        let (ctx, scope) = ctx();
        let t = load_type("{name, age: number}", &scope, &ctx).unwrap();
        assert_eq!(t.field("name").unwrap().name(), "string");
        assert_eq!(t.field("age").unwrap().name(), "number");
    }

    #[test]
    fn test_union_of_basics() {
        let (ctx, scope) = ctx();
        let t = load_type("number | string", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "number | string");
        assert_eq!(t.variants.len(), 2);
    }

    #[test]
    fn test_union_inside_generic() {
        let (ctx, scope) = ctx();
        let t = load_type("map<number|string>", &scope, &ctx).unwrap();
        let v = t.member("k").unwrap();
        assert_eq!(v.variants.len(), 2);
    }

    #[test]
    fn test_intersection_of_tables() {
        let (ctx, scope) = ctx();
        let t = load_type("{x: number} & {y: string}", &scope, &ctx).unwrap();
        assert!(t.field("x").is_some());
        assert!(t.field("y").is_some());
        assert!(!t.name().contains('&'));
    }

    #[test]
    fn test_scope_identifier_and_member_path() {
        let (ctx, scope) = ctx();
        let user = Type::table();
        user.set_field("id", basic_type("number").unwrap());
        scope.bind("User", Some(user));

        let t = load_type("User", &scope, &ctx).unwrap();
        assert_eq!(t.field("id").unwrap().name(), "number");

        // Basic results keep their canonical name through the path.
        let t = load_type("User.id", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "number");
    }

    #[test]
    fn test_at_prefixed_custom_type() {
        let (ctx, scope) = ctx();
        let order = Type::table();
        order.set_field("total", basic_type("number").unwrap());
        ctx.session.register_type("Order", order);

        let t = load_type("arr<@Order>", &scope, &ctx).unwrap();
        assert_eq!(t.element().unwrap().field("total").unwrap().name(), "number");
    }

    #[test]
    fn test_req_res_prefer_explicit_fields() {
        let (ctx, scope) = ctx();
        let handler = Type::table();
        handler.set_field("$req", basic_type("number").unwrap());
        handler.set_field("$res", basic_type("boolean").unwrap());
        scope.bind("handler", Some(handler));

        let req = load_type("req<handler>", &scope, &ctx).unwrap();
        assert_eq!(req.name(), "number");
        let res = load_type("res<handler>", &scope, &ctx).unwrap();
        assert_eq!(res.name(), "boolean");
    }

    #[test]
    fn test_req_res_fall_back_to_signature() {
        // No $req/$res fields are set, so req<> introspects the first
        // parameter's annotation and res<> abstractly invokes the body.
        let chunk = lunar_syntax::parse(
            "function handler(arg) -- @arg {id: number} @return string\nreturn \"ok\"\nend",
        )
        .unwrap();
        let session = Session::new("/tmp/lunar-annotation-tests");
        let scope = Scope::child(&session.globals());
        let ctx = EvalCtx {
            session,
            file: PathBuf::from("test.lua"),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: None,
        };
        let lunar_syntax::StatKind::FunctionDecl { name, func, .. } = &chunk.body.stats[0].kind
        else {
            panic!("expected function decl");
        };
        let f = crate::func::FnModel::build(
            name.path.join("."),
            Rc::new(func.clone()),
            &scope,
            &ctx,
        );
        scope.bind("handler", Some(f));

        let req = load_type("req<handler>", &scope, &ctx).unwrap();
        assert_eq!(req.field("id").unwrap().name(), "number");
        let res = load_type("res<handler>", &scope, &ctx).unwrap();
        assert_eq!(res.name(), "string");
    }

    #[test]
    fn test_indexer_forms() {
        let (ctx, scope) = ctx();
        let t = load_type("string[]", &scope, &ctx).unwrap();
        assert_eq!(t.element().unwrap().name(), "string");

        let rec = Type::table();
        rec.set_field("id", basic_type("number").unwrap());
        scope.bind("Rec", Some(rec));
        let t = load_type("Rec[\"id\"]", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "number");
    }

    #[test]
    fn test_malformed_degrades_not_fails() {
        let (ctx, scope) = ctx();
        assert!(load_type("", &scope, &ctx).is_none());
        assert!(load_type("no_such_type_here", &scope, &ctx).is_none());
        // Partial failure inside a union degrades that member, the rest
        // survives.
        let t = load_type("number | no_such_type_here", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "number");
    }

    #[test]
    fn test_comment_suffix_stripped() {
        let (ctx, scope) = ctx();
        let t = load_type("number // the count", &scope, &ctx).unwrap();
        assert_eq!(t.name(), "number");
    }

    #[test]
    fn test_gen_args_signature() {
        let (ctx, scope) = ctx();
        let args = gen_args("(name: string, age: number, extra)", &scope, &ctx, false);
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].name(), "string");
        assert_eq!(args[1].name(), "number");
        assert!(args[2].is_any());
    }

    #[test]
    fn test_gen_args_defaults() {
        let (ctx, scope) = ctx();
        let args = gen_args("(flag=true, count=10)", &scope, &ctx, false);
        assert_eq!(args[0].name(), "boolean");
        assert_eq!(args[1].name(), "number");
    }

    #[test]
    fn test_gen_value_union_signature() {
        let (ctx, scope) = ctx();
        let rowx = Type::table();
        rowx.set_field("id", basic_type("number").unwrap());
        scope.bind("rowx", Some(rowx));

        let t = gen_value("rowx | string[] | map<string>[]", &scope, &ctx).unwrap();
        assert_eq!(t.variants.len(), 3);
    }
}
