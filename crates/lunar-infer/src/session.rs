//! Analysis session: module cache, dependency graph and invalidation.
//!
//! One `Session` is the unit of sharing for a whole analysis. It is a
//! cheap `Rc` handle: function models and builtin closures capture clones
//! of it so a module resolved from deep inside an abstract call still
//! lands in the same cache.

use crate::builtins;
use crate::eval::{self, EvalCtx};
use crate::scope::Scope;
use lunar_syntax::{parse, CommentMap};
use lunar_types::{arr_of, basic_type, Ty, Type};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Cached resolution state for one file.
#[derive(Clone)]
enum ModEntry {
    /// Resolution is underway; the placeholder namespace is handed to
    /// re-entrant resolutions so mutual requires terminate.
    Loading(Ty),
    /// Finished, possibly with no usable namespace.
    Ready(Option<Ty>),
}

struct SessionInner {
    project_root: PathBuf,
    search_roots: Vec<PathBuf>,
    globals: RefCell<Option<Rc<Scope>>>,
    cache: RefCell<FxHashMap<PathBuf, ModEntry>>,
    // dependency file -> files whose analysis used it
    depends: RefCell<FxHashMap<PathBuf, Vec<PathBuf>>>,
    dir_cache: RefCell<FxHashMap<PathBuf, Vec<String>>>,
    custom_types: RefCell<FxHashMap<String, Ty>>,
    live_edit: Cell<bool>,
}

/// Shared handle to one analysis session.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// New session rooted at a project directory.
    ///
    /// Module names are searched under the root itself and its `lua/` and
    /// `lualib/` subdirectories; `$name` row types load from `dao/`.
    pub fn new(project_root: impl Into<PathBuf>) -> Session {
        let project_root = project_root.into();
        let search_roots = vec![
            project_root.clone(),
            project_root.join("lua"),
            project_root.join("lualib"),
        ];
        Session {
            inner: Rc::new(SessionInner {
                project_root,
                search_roots,
                globals: RefCell::new(None),
                cache: RefCell::new(FxHashMap::default()),
                depends: RefCell::new(FxHashMap::default()),
                dir_cache: RefCell::new(FxHashMap::default()),
                custom_types: RefCell::new(FxHashMap::default()),
                live_edit: Cell::new(false),
            }),
        }
    }

    /// Project root directory.
    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    /// The shared global scope, built on first use.
    pub fn globals(&self) -> Rc<Scope> {
        if let Some(g) = self.inner.globals.borrow().as_ref() {
            return g.clone();
        }
        let g = builtins::global_scope(self);
        *self.inner.globals.borrow_mut() = Some(g.clone());
        g
    }

    /// Toggle live-edit mode: function bodies are always re-executed so
    /// an in-flight edit sees fresh types.
    pub fn set_live_edit(&self, on: bool) {
        self.inner.live_edit.set(on);
    }

    /// Whether live-edit mode is active.
    pub fn live_edit(&self) -> bool {
        self.inner.live_edit.get()
    }

    // ----- custom types ------------------------------------------------

    /// Register a project-defined named type (`@Name` in annotations).
    pub fn register_type(&self, name: impl Into<String>, ty: Ty) {
        self.inner.custom_types.borrow_mut().insert(name.into(), ty);
    }

    /// Look up a project-defined named type.
    pub fn custom_type(&self, name: &str) -> Option<Ty> {
        self.inner.custom_types.borrow().get(name).cloned()
    }

    // ----- module resolution -------------------------------------------

    /// Resolve a module by its textual name.
    ///
    /// `from` is the file whose analysis triggered the resolution and is
    /// recorded as a dependent for invalidation.
    pub fn resolve(&self, name: &str, from: Option<&Path>) -> Option<Ty> {
        let name = if name == "cjson.safe" { "cjson" } else { name };

        if let Some(row) = name.strip_prefix('$') {
            return self.load_dao(row, from);
        }

        // Builtin libraries and their dotted members resolve against the
        // global scope, not the filesystem.
        let globals = self.globals();
        if let Some((lib, member)) = name.split_once('.') {
            if let Some(t) = globals.get(lib) {
                if let Some(m) = t.member(member) {
                    return Some(m);
                }
            }
        } else if let Some(t) = globals.get(name) {
            return Some(t);
        }

        let file = self.module_file(name)?;
        self.resolve_file(&file, from)
    }

    /// Resolve a module by file path, using and populating the cache.
    pub fn resolve_file(&self, file: &Path, from: Option<&Path>) -> Option<Ty> {
        if let Some(from) = from {
            self.set_depend(from, file);
        }

        match self.inner.cache.borrow().get(file) {
            Some(ModEntry::Loading(t)) => return Some(t.clone()),
            Some(ModEntry::Ready(t)) => return t.clone(),
            None => {}
        }

        let source = match fs::read_to_string(file) {
            Ok(s) => s,
            Err(_) => {
                self.inner
                    .cache
                    .borrow_mut()
                    .insert(file.to_path_buf(), ModEntry::Ready(None));
                return None;
            }
        };
        let chunk = match parse(&source) {
            Ok(c) => c,
            Err(_) => {
                self.inner
                    .cache
                    .borrow_mut()
                    .insert(file.to_path_buf(), ModEntry::Ready(None));
                return None;
            }
        };

        // Mark in progress before evaluating: a re-entrant resolution of
        // the same file gets this (possibly partial) namespace instead of
        // recursing forever.
        let placeholder = Type::table();
        self.inner
            .cache
            .borrow_mut()
            .insert(file.to_path_buf(), ModEntry::Loading(placeholder.clone()));

        let scope = Scope::child(&self.globals());
        let ctx = EvalCtx {
            session: self.clone(),
            file: file.to_path_buf(),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: None,
        };
        ctx.register_declared_types(&scope);

        let mut result = eval::eval_block(&chunk.body, &scope, &ctx);

        if let Some(ref t) = result {
            if is_dao_file(file) {
                result = Some(self.attach_dao(t.clone(), file, &ctx));
            }
        }

        // A cyclic dependent that hit the Loading entry captured the
        // placeholder. Graft the finished exports onto it so that view
        // converges to the real namespace once resolution completes.
        if let Some(ref t) = result {
            if !Rc::ptr_eq(t, &placeholder) {
                placeholder
                    .fields
                    .borrow_mut()
                    .extend(t.fields.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                *placeholder.element.borrow_mut() = t.element.borrow().clone();
                *placeholder.index_fallback.borrow_mut() = t.index_fallback.borrow().clone();
                *placeholder.doc.borrow_mut() = t.doc.borrow().clone();
            }
        }

        self.inner
            .cache
            .borrow_mut()
            .insert(file.to_path_buf(), ModEntry::Ready(result.clone()));
        result
    }

    /// Resolve `$name` to the row type of the matching dao module.
    pub fn load_dao(&self, name: &str, from: Option<&Path>) -> Option<Ty> {
        let file = self.dao_file(name)?;
        let module = self.resolve_file(&file, from)?;
        let row = module.field("row")?;
        let named = Type::declared_table(format!("${}", name), row.fields.borrow().clone());
        named.set_doc(format!("## ${}\ndao row type", name));
        Some(named)
    }

    /// Inject `row` / `row[]` / query-shape fields into a dao module's
    /// namespace, derived from its exported data fields.
    fn attach_dao(&self, module: Ty, file: &Path, ctx: &EvalCtx) -> Ty {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut row_fields: FxHashMap<String, Ty> = FxHashMap::default();
        for (k, v) in module.fields.borrow().iter() {
            if k.starts_with('$') || k.starts_with('_') || v.is_callable() {
                continue;
            }
            row_fields.insert(k.clone(), v.clone());
        }

        let row = Type::declared_table(format!("${}", stem), row_fields.clone());
        *row.element.borrow_mut() = Some(Type::never());
        row.set_doc(format!("## ${}\ndao row type", stem));

        let rows = arr_of(&format!("${}[]", stem), row.clone());

        // rowx additionally accepts the query-clause extension fields.
        let mut rowx_fields = row_fields;
        rowx_fields.insert("_order_by".into(), basic_type("string").unwrap_or_else(Type::any));
        rowx_fields.insert("_group_by".into(), basic_type("string").unwrap_or_else(Type::any));
        rowx_fields.insert(
            "_limit".into(),
            lunar_types::union_types(&[basic_type("number"), basic_type("string")]),
        );
        let rowx = Type::declared_table(format!("${}", stem), rowx_fields);

        let dao_scope = Scope::child(&self.globals());
        dao_scope.bind("row", Some(row.clone()));
        dao_scope.bind("row[]", Some(rows.clone()));
        dao_scope.bind("rowx", Some(rowx));

        let query = crate::annotation::gen_value("rowx | string[] | map<string>[]", &dao_scope, ctx);
        let update = crate::annotation::gen_value("row | string[] | (row | string[])[]", &dao_scope, ctx);
        let where_ = crate::annotation::gen_value("row | string[]", &dao_scope, ctx);

        module.set_field("row", row);
        module.set_field("row[]", rows);
        if let Some(t) = query {
            module.set_field("query", t);
        }
        if let Some(t) = update {
            module.set_field("update", t);
        }
        if let Some(t) = where_ {
            module.set_field("where", t);
        }
        module
    }

    /// Candidate-path search for a module name.
    pub fn module_file(&self, name: &str) -> Option<PathBuf> {
        let rel: PathBuf = name.split('.').collect();
        let rel = rel.with_extension("lua");
        for root in &self.inner.search_roots {
            let candidate = root.join(&rel);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn dao_file(&self, name: &str) -> Option<PathBuf> {
        for root in &self.inner.search_roots {
            let candidate = root.join("dao").join(name).with_extension("lua");
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    // ----- dependency graph and invalidation ---------------------------

    /// Record that `dependent`'s analysis used `dependency`.
    ///
    /// Self-edges and transient edit buffers are skipped, and when the
    /// reverse edge already exists (two files requiring each other) the
    /// new edge is not added, so invalidation of either file cannot ping
    /// back through the other.
    pub fn set_depend(&self, dependent: &Path, dependency: &Path) {
        if dependent == dependency {
            return;
        }
        if dependent.to_string_lossy().ends_with(".editing") {
            return;
        }
        let mut depends = self.inner.depends.borrow_mut();
        if depends
            .get(dependent)
            .is_some_and(|deps| deps.iter().any(|d| d == dependency))
        {
            return;
        }
        let dependents = depends.entry(dependency.to_path_buf()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_path_buf());
        }
    }

    /// Evict `file` and, depth-first, everything that depends on it.
    ///
    /// Each path's dependent list is removed before it is walked, so
    /// cyclic graphs terminate: re-invalidating an evicted path finds
    /// nothing left to do.
    pub fn invalidate(&self, file: &Path) {
        self.inner.cache.borrow_mut().remove(file);
        self.inner.dir_cache.borrow_mut().remove(file);
        if let Some(parent) = file.parent() {
            self.inner.dir_cache.borrow_mut().remove(parent);
        }

        let dependents = self.inner.depends.borrow_mut().remove(file);
        if let Some(dependents) = dependents {
            for d in dependents {
                self.invalidate(&d);
            }
        }
    }

    /// Whether `file` currently has a cache entry.
    pub fn is_cached(&self, file: &Path) -> bool {
        self.inner.cache.borrow().contains_key(file)
    }

    /// Module names available under a directory, for listing and
    /// completion surfaces. Cached until the directory is invalidated.
    pub fn module_names(&self, dir: &Path) -> Vec<String> {
        if let Some(names) = self.inner.dir_cache.borrow().get(dir) {
            return names.clone();
        }
        let mut names = Vec::new();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == "_bk" || name == "init.lua" || name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                if path.is_dir() {
                    names.push(name);
                } else if let Some(stem) = name.strip_suffix(".lua") {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        self.inner
            .dir_cache
            .borrow_mut()
            .insert(dir.to_path_buf(), names.clone());
        names
    }
}

fn is_dao_file(file: &Path) -> bool {
    file.parent()
        .and_then(|p| p.file_name())
        .is_some_and(|n| n == "dao")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depend_edges_and_invalidation_chain() {
        let s = Session::new("/tmp/none");
        let a = PathBuf::from("/p/a.lua");
        let b = PathBuf::from("/p/b.lua");
        let c = PathBuf::from("/p/c.lua");

        // b requires a, c requires b
        s.set_depend(&b, &a);
        s.set_depend(&c, &b);

        for f in [&a, &b, &c] {
            s.inner
                .cache
                .borrow_mut()
                .insert(f.clone(), ModEntry::Ready(None));
        }

        s.invalidate(&a);
        assert!(!s.is_cached(&a));
        assert!(!s.is_cached(&b));
        assert!(!s.is_cached(&c));
    }

    #[test]
    fn test_invalidate_middle_leaves_upstream() {
        let s = Session::new("/tmp/none");
        let a = PathBuf::from("/p/a.lua");
        let b = PathBuf::from("/p/b.lua");
        let c = PathBuf::from("/p/c.lua");
        s.set_depend(&b, &a);
        s.set_depend(&c, &b);
        for f in [&a, &b, &c] {
            s.inner
                .cache
                .borrow_mut()
                .insert(f.clone(), ModEntry::Ready(None));
        }

        s.invalidate(&b);
        assert!(s.is_cached(&a));
        assert!(!s.is_cached(&b));
        assert!(!s.is_cached(&c));
    }

    #[test]
    fn test_reverse_edge_suppressed() {
        let s = Session::new("/tmp/none");
        let a = PathBuf::from("/p/a.lua");
        let b = PathBuf::from("/p/b.lua");
        s.set_depend(&a, &b);
        s.set_depend(&b, &a); // reverse of an existing edge
        assert!(s.inner.depends.borrow().get(&a).is_none());
    }

    #[test]
    fn test_editing_buffers_never_recorded() {
        let s = Session::new("/tmp/none");
        let a = PathBuf::from("/p/a.lua.editing");
        let b = PathBuf::from("/p/b.lua");
        s.set_depend(&a, &b);
        assert!(s.inner.depends.borrow().is_empty());
    }
}
