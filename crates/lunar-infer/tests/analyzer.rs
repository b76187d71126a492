//! End-to-end analysis over real files in a temporary project tree.

use lunar_infer::Analyzer;
use lunar_types::Callable;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_module_resolution_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "util.lua",
        "local M = {}\nM.version = \"1.0\"\nreturn M",
    );

    let analyzer = Analyzer::new(dir.path());
    let a = analyzer.resolve_module("util").unwrap();
    let b = analyzer.resolve_module("util").unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.field("version").unwrap().name(), "string");
}

#[test]
fn test_modules_resolve_from_lua_subdirectory() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "lua/app/user.lua",
        "local M = {}\nM.kind = \"user\"\nreturn M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.resolve_module("app.user").unwrap();
    assert_eq!(m.field("kind").unwrap().name(), "string");
}

#[test]
fn test_require_links_modules() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.lua",
        "local M = {}\nM.port = 8080\nreturn M",
    );
    let server = write(
        dir.path(),
        "server.lua",
        "local config = require(\"config\")\nlocal M = {}\nM.port = config.port\nreturn M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.analyze_file(&server).unwrap();
    assert_eq!(m.field("port").unwrap().name(), "number");
}

#[test]
fn test_annotated_function_end_to_end() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "calc.lua",
        "local M = {}\n\n\
         -- @a number @b number @return number\n\
         function M.add(a, b)\n\
         return a + b\n\
         end\n\n\
         return M",
    );

    let analyzer = Analyzer::new(dir.path());
    let r = analyzer.type_of_expr(&file, "M.add(1, 2)").unwrap();
    assert_eq!(r.name(), "number");

    let doc = analyzer.documentation_for(&file, "M").unwrap();
    assert!(!doc.is_empty());
}

#[test]
fn test_invalidation_chain() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.lua", "return { n = 1 }");
    let b = write(
        dir.path(),
        "b.lua",
        "local a = require(\"a\")\nreturn { n = a.n }",
    );
    let c = write(
        dir.path(),
        "c.lua",
        "local b = require(\"b\")\nreturn { n = b.n }",
    );

    let analyzer = Analyzer::new(dir.path());
    analyzer.analyze_file(&c).unwrap();
    assert!(analyzer.session().is_cached(&a));
    assert!(analyzer.session().is_cached(&b));
    assert!(analyzer.session().is_cached(&c));

    // Editing the deepest dependency evicts the whole chain.
    analyzer.on_file_changed(&a);
    assert!(!analyzer.session().is_cached(&a));
    assert!(!analyzer.session().is_cached(&b));
    assert!(!analyzer.session().is_cached(&c));
}

#[test]
fn test_invalidating_middle_keeps_upstream() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.lua", "return { n = 1 }");
    let b = write(
        dir.path(),
        "b.lua",
        "local a = require(\"a\")\nreturn { n = a.n }",
    );

    let analyzer = Analyzer::new(dir.path());
    analyzer.analyze_file(&b).unwrap();

    analyzer.on_file_changed(&b);
    assert!(analyzer.session().is_cached(&a));
    assert!(!analyzer.session().is_cached(&b));
}

#[test]
fn test_mutual_require_terminates() {
    let dir = TempDir::new().unwrap();
    let a = write(
        dir.path(),
        "a.lua",
        "local b = require(\"b\")\nlocal M = {}\nM.name = \"a\"\nreturn M",
    );
    write(
        dir.path(),
        "b.lua",
        "local a = require(\"a\")\nlocal M = {}\nM.name = \"b\"\nreturn M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.analyze_file(&a).unwrap();
    assert_eq!(m.field("name").unwrap().name(), "string");
}

#[test]
fn test_cyclic_require_converges_to_final_exports() {
    let dir = TempDir::new().unwrap();
    let a = write(
        dir.path(),
        "a.lua",
        "local M = {}\nlocal b = require(\"b\")\nM.limit = 10\nreturn M",
    );
    write(
        dir.path(),
        "b.lua",
        "local a = require(\"a\")\nlocal M = {}\n\
         function M.limit_of()\nreturn a.limit\nend\n\
         return M",
    );

    let analyzer = Analyzer::new(dir.path());
    analyzer.analyze_file(&a).unwrap();

    // b captured a's in-progress namespace; fields a exported after the
    // cycle point are visible through it once resolution completes.
    let b = analyzer.resolve_module("b").unwrap();
    let f = b.field("limit_of").unwrap();
    let r = f.call.as_ref().unwrap().invoke(&[]).unwrap();
    assert_eq!(r.name(), "number");
}

#[test]
fn test_dao_row_injection() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "dao/user.lua",
        "local M = {}\n\
         M.id = 0\n\
         M.name = \"\"\n\
         M._internal = true\n\
         function M.table_name()\n\
         return \"user\"\n\
         end\n\
         return M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.resolve_module("dao.user").unwrap();

    let row = m.field("row").unwrap();
    assert_eq!(row.name(), "$user");
    assert_eq!(row.field("id").unwrap().name(), "number");
    assert_eq!(row.field("name").unwrap().name(), "string");
    assert!(row.field("_internal").is_none());
    assert!(row.field("table_name").is_none());

    let rows = m.field("row[]").unwrap();
    assert_eq!(rows.element().unwrap().name(), "$user");

    assert!(m.field("query").is_some());
    assert!(m.field("update").is_some());
    assert!(m.field("where").is_some());
}

#[test]
fn test_dollar_annotation_loads_dao_row() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "dao/order.lua",
        "local M = {}\nM.id = 0\nM.total = 0\nreturn M",
    );
    let handler = write(
        dir.path(),
        "handler.lua",
        "local row = {} -- @row $order\nlocal M = {}\nM.row = row\nreturn M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.analyze_file(&handler).unwrap();
    let row = m.field("row").unwrap();
    assert_eq!(row.name(), "$order");
    assert_eq!(row.field("total").unwrap().name(), "number");
}

#[test]
fn test_check_source_reports_member_lints() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "bad.lua",
        "local conf = {} -- @conf {host: string, port: number}\n\
         local x = conf.hots\n\
         return x",
    );

    let analyzer = Analyzer::new(dir.path());
    let report = analyzer.check_file(&file).unwrap();
    assert_eq!(report.len(), 1);
    assert!(report[0].message.contains("hots"));
    assert_eq!(report[0].range.start.line, 1);
}

#[test]
fn test_check_source_clean_file_is_quiet() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "good.lua",
        "local conf = {} -- @conf {host: string}\n\
         local x = conf.host\n\
         return x",
    );

    let analyzer = Analyzer::new(dir.path());
    let report = analyzer.check_file(&file).unwrap();
    assert!(report.is_empty(), "unexpected: {:?}", report);
}

#[test]
fn test_check_reports_only_the_checked_file() {
    let dir = TempDir::new().unwrap();
    let main = write(
        dir.path(),
        "main.lua",
        "local dep = require(\"dep\")\nreturn dep",
    );
    let dep = write(
        dir.path(),
        "dep.lua",
        "local conf = {} -- @conf {host: string}\n\
         local M = {}\n\
         M.bad = conf.hots\n\
         return M",
    );

    let analyzer = Analyzer::new(dir.path());
    // dep is resolved while checking main; its finding belongs to dep's
    // own report, not main's.
    let report = analyzer.check_file(&main).unwrap();
    assert!(report.is_empty(), "unexpected: {:?}", report);

    let report = analyzer.check_file(&dep).unwrap();
    assert_eq!(report.len(), 1);
    assert!(report[0].message.contains("hots"));
}

#[test]
fn test_custom_type_shared_across_project() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "types.lua",
        "-- @Point {x: number, y: number}\nreturn {}",
    );
    let user = write(
        dir.path(),
        "use.lua",
        "local types = require(\"types\")\n\
         local p = {} -- @p @Point\n\
         local M = {}\n\
         M.x = p.x\n\
         return M",
    );

    let analyzer = Analyzer::new(dir.path());
    let m = analyzer.analyze_file(&user).unwrap();
    assert_eq!(m.field("x").unwrap().name(), "number");
}

#[test]
fn test_definition_and_symbol_listing() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "mod.lua",
        "local first = 1\nlocal second = \"s\"\nreturn { first = first }",
    );

    let analyzer = Analyzer::new(dir.path());
    let origin = analyzer.definition_of(&file, "second").unwrap();
    assert_eq!(origin.line, 2);

    let symbols = analyzer.symbols(&file);
    assert_eq!(symbols, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn test_parse_error_surfaces() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "broken.lua", "local = = =");

    let analyzer = Analyzer::new(dir.path());
    assert!(analyzer.check_file(&file).is_err());
}
