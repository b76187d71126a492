//! The built-in global surface: Lua base functions, the standard
//! libraries the analyzer models, and the OpenResty `ngx` namespace.
//!
//! Libraries are declared (readonly) tables so that a reference to an
//! unknown member lints. Return shapes are coarse: a builtin whose result
//! cannot be usefully modeled yields `nil` or `any`.

use crate::scope::Scope;
use crate::session::Session;
use lunar_types::{map_of, union_types, BasicType, NativeFn, Ty, Type};
use rustc_hash::FxHashMap;
use std::rc::Rc;

fn num() -> Ty {
    Type::basic(BasicType::Number)
}

fn str_() -> Ty {
    Type::basic(BasicType::String)
}

fn boolean() -> Ty {
    Type::basic(BasicType::Boolean)
}

fn nil() -> Ty {
    Type::basic(BasicType::Nil)
}

/// Callable that always yields `result`.
fn constant(result: Ty, args: &str, doc: &str) -> Ty {
    Type::callable(Rc::new(NativeFn::constant(result, args, doc)))
}

/// Callable computed from its argument types.
fn native(
    run: impl Fn(&[Option<Ty>]) -> Option<Ty> + 'static,
    args: &str,
    doc: &str,
) -> Ty {
    Type::callable(Rc::new(NativeFn::new(run, args, doc)))
}

fn lib(name: &str, fields: FxHashMap<String, Ty>) -> Ty {
    Type::declared_table(name, fields)
}

/// Build the global scope for a session: base functions, standard
/// libraries, and `ngx`. Called once per session and shared by every
/// module scope.
pub fn global_scope(_session: &Session) -> Rc<Scope> {
    let g = Scope::root();

    g.bind("_G", Some(Type::any()));
    g.bind("print", Some(constant(nil(), "(...)", "#### print (...)")));
    g.bind(
        "type",
        Some(constant(str_(), "(v)", "#### type (v)\nruntime kind name")),
    );
    g.bind(
        "tostring",
        Some(constant(str_(), "(v)", "#### tostring (v)")),
    );
    g.bind(
        "tonumber",
        Some(constant(num(), "(v, base?)", "#### tonumber (v, base?)")),
    );
    g.bind(
        "pcall",
        Some(constant(boolean(), "(f, ...)", "#### pcall (f, ...)")),
    );
    g.bind("error", Some(constant(nil(), "(message)", "#### error (message)")));
    g.bind(
        "select",
        Some(constant(num(), "(n, ...)", "#### select (n, ...)")),
    );
    g.bind(
        "rawget",
        Some(constant(Type::any(), "(t, k)", "#### rawget (t, k)")),
    );

    // Loop iterators are resolved structurally at the `for` statement;
    // the bindings exist for hover and first-class references.
    g.bind(
        "pairs",
        Some(native(|_| None, "(t: table)", "#### pairs (t)")),
    );
    g.bind(
        "ipairs",
        Some(native(|_| None, "(t: table)", "#### ipairs (t)")),
    );

    // Module loading needs the literal module name, which only the call
    // site has. These bindings carry documentation; resolution happens
    // at the call expression.
    g.bind(
        "require",
        Some(native(|_| None, "(modname: string)", "#### require (modname)")),
    );
    g.bind(
        "_load",
        Some(native(|_| None, "(modname: string)", "#### _load (modname)")),
    );

    g.bind(
        "setmetatable",
        Some(native(
            |args| {
                let t = args.first().cloned().flatten()?;
                if let Some(mt) = args.get(1).cloned().flatten() {
                    if let Some(index) = mt.field("__index") {
                        *t.index_fallback.borrow_mut() = Some(index);
                    }
                }
                Some(t)
            },
            "(t: table, mt: table)",
            "#### setmetatable (t, mt)",
        )),
    );
    g.bind(
        "unpack",
        Some(native(
            |args| args.first().cloned().flatten().and_then(|t| t.element()),
            "(list: table)",
            "#### unpack (list)",
        )),
    );

    g.bind("table", Some(table_lib()));
    g.bind("string", Some(string_lib()));
    g.bind("math", Some(math_lib()));
    g.bind("os", Some(os_lib()));
    g.bind("cjson", Some(cjson_lib()));
    g.bind("ngx", Some(ngx_lib()));

    g
}

fn table_lib() -> Ty {
    let mut f = FxHashMap::default();
    // insert grows the element union of its target in place.
    f.insert(
        "insert".to_string(),
        native(
            |args| {
                if let (Some(list), Some(value)) =
                    (args.first().cloned().flatten(), args.get(1).cloned().flatten())
                {
                    let merged = union_types(&[list.element(), Some(value)]);
                    *list.element.borrow_mut() = Some(merged);
                }
                None
            },
            "(list: table, value)",
            "#### table.insert (list, value)",
        ),
    );
    f.insert(
        "remove".to_string(),
        native(
            |args| args.first().cloned().flatten().and_then(|t| t.element()),
            "(list: table, pos?: number)",
            "#### table.remove (list, pos?)",
        ),
    );
    f.insert(
        "unpack".to_string(),
        native(
            |args| args.first().cloned().flatten().and_then(|t| t.element()),
            "(list: table)",
            "#### table.unpack (list)",
        ),
    );
    f.insert(
        "concat".to_string(),
        constant(str_(), "(list: table, sep?: string)", "#### table.concat"),
    );
    f.insert("sort".to_string(), constant(nil(), "(list: table, comp?)", ""));
    f.insert("new".to_string(), native(|_| Some(Type::table()), "(narr: number, nrec: number)", ""));
    f.insert("nkeys".to_string(), constant(num(), "(t: table)", ""));
    f.insert(
        "clone".to_string(),
        native(|args| args.first().cloned().flatten(), "(t: table)", ""),
    );
    f.insert("clear".to_string(), constant(nil(), "(t: table)", ""));
    f.insert("getn".to_string(), constant(num(), "(list: table)", ""));
    lib("table", f)
}

fn string_lib() -> Ty {
    let mut f = FxHashMap::default();
    for name in ["sub", "upper", "lower", "rep", "format", "gsub", "match", "char", "reverse"] {
        f.insert(name.to_string(), constant(str_(), "(s: string, ...)", ""));
    }
    for name in ["len", "byte", "find"] {
        f.insert(name.to_string(), constant(num(), "(s: string, ...)", ""));
    }
    f.insert("gmatch".to_string(), constant(Type::function(), "(s: string, pattern: string)", ""));
    lib("string", f)
}

fn math_lib() -> Ty {
    let mut f = FxHashMap::default();
    for name in ["floor", "ceil", "abs", "max", "min", "random", "sqrt", "fmod", "pow"] {
        f.insert(name.to_string(), constant(num(), "(...)", ""));
    }
    f.insert("pi".to_string(), num());
    f.insert("huge".to_string(), num());
    lib("math", f)
}

fn os_lib() -> Ty {
    let mut f = FxHashMap::default();
    f.insert("time".to_string(), constant(num(), "()", ""));
    f.insert("clock".to_string(), constant(num(), "()", ""));
    f.insert("date".to_string(), constant(str_(), "(format?: string, time?: number)", ""));
    f.insert("getenv".to_string(), constant(str_(), "(name: string)", ""));
    lib("os", f)
}

fn cjson_lib() -> Ty {
    let mut f = FxHashMap::default();
    f.insert(
        "encode".to_string(),
        constant(str_(), "(value)", "#### cjson.encode (value)"),
    );
    f.insert(
        "decode".to_string(),
        constant(Type::any(), "(text: string)", "#### cjson.decode (text)"),
    );
    lib("cjson", f)
}

fn ngx_lib() -> Ty {
    let mut f = FxHashMap::default();
    f.insert("var".to_string(), map_of("map<string>", str_()));
    f.insert("header".to_string(), map_of("map<string>", str_()));
    f.insert("ctx".to_string(), Type::table());
    for name in ["say", "print", "log", "exit", "sleep", "flush"] {
        f.insert(name.to_string(), constant(nil(), "(...)", ""));
    }
    for name in ["time", "now", "update_time", "worker_pid"] {
        f.insert(name.to_string(), constant(num(), "()", ""));
    }
    for name in ["md5", "encode_base64", "decode_base64", "quote_sql_str", "escape_uri", "unescape_uri"] {
        f.insert(name.to_string(), constant(str_(), "(s: string)", ""));
    }
    for name in ["ERR", "WARN", "NOTICE", "INFO", "DEBUG"] {
        f.insert(name.to_string(), num());
    }

    let mut req = FxHashMap::default();
    req.insert("get_headers".to_string(), constant(map_of("map<string>", str_()), "()", ""));
    req.insert("get_uri_args".to_string(), constant(map_of("map<string>", str_()), "()", ""));
    req.insert("get_post_args".to_string(), constant(map_of("map<string>", str_()), "()", ""));
    req.insert("read_body".to_string(), constant(nil(), "()", ""));
    req.insert("get_body_data".to_string(), constant(str_(), "()", ""));
    req.insert("get_method".to_string(), constant(str_(), "()", ""));
    f.insert("req".to_string(), lib("ngx.req", req));

    lib("ngx", f)
}
