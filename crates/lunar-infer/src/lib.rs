//! Lunar Type Inference
//!
//! Structural type inference for the Lua dialect used in OpenResty-style
//! projects: modules are files returning a table, and doc-comment
//! annotations (`-- @name type`) refine what inference alone cannot see.
//!
//! The engine is abstract evaluation, not checking: a chunk is executed
//! over types instead of values, calls are resolved by running the callee
//! model, and `require` pulls in the inferred namespace of another file
//! through a session-wide cache with dependency invalidation.
//!
//! [`Analyzer`] is the front door. One analyzer owns one [`Session`];
//! everything is single-threaded and `Rc`-shared.
//!
//! ```no_run
//! use lunar_infer::Analyzer;
//!
//! let analyzer = Analyzer::new("/srv/app");
//! let report = analyzer.check_file("/srv/app/lua/user.lua".as_ref())?;
//! for d in &report {
//!     println!("{}: {}", d.range.start.line + 1, d.message);
//! }
//! # Ok::<(), lunar_infer::AnalyzeError>(())
//! ```

#![warn(missing_docs)]

pub mod annotation;
pub mod builtins;
pub mod diagnostics;
pub mod eval;
pub mod func;
pub mod scope;
pub mod session;

pub use diagnostics::{Diagnostic, DiagnosticSink, Position, Range, Severity};
pub use eval::EvalCtx;
pub use func::FnModel;
pub use scope::Scope;
pub use session::Session;

use lunar_syntax::{parse, CommentMap, ParseError};
use lunar_types::{Origin, Ty};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// Failure to analyze a file.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The file could not be read
    #[error("cannot read source file: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not parse
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A project analyzer: one session, one module cache, one global scope.
pub struct Analyzer {
    session: Session,
}

impl Analyzer {
    /// Create an analyzer rooted at a project directory. Modules resolve
    /// against the root and its `lua/` and `lualib/` subdirectories.
    pub fn new(project_root: impl Into<PathBuf>) -> Analyzer {
        Analyzer {
            session: Session::new(project_root),
        }
    }

    /// The underlying session, for callers that drive resolution
    /// directly.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve a module by name to its inferred namespace type.
    pub fn resolve_module(&self, name: &str) -> Option<Ty> {
        self.session.resolve(name, None)
    }

    /// Infer the type a file's top-level `return` produces.
    pub fn analyze_file(&self, path: &Path) -> Option<Ty> {
        self.session.resolve_file(path, None)
    }

    /// Run the diagnostics pass over one file: parse errors surface as
    /// [`AnalyzeError`], type lints come back as [`Diagnostic`] values.
    ///
    /// The file is evaluated outside the module cache so that an
    /// in-editor buffer never pollutes resolution for its dependents.
    pub fn check_file(&self, path: &Path) -> Result<Vec<Diagnostic>, AnalyzeError> {
        let source = fs::read_to_string(path)?;
        self.check_source(path, &source)
    }

    /// [`Analyzer::check_file`] over an in-memory buffer.
    pub fn check_source(
        &self,
        path: &Path,
        source: &str,
    ) -> Result<Vec<Diagnostic>, AnalyzeError> {
        let chunk = parse(source)?;
        let sink = Rc::new(DiagnosticSink::new());

        // The sink rides on the context, so it only sees this file:
        // dependencies resolved along the way evaluate under their own
        // contexts and stay out of the report.
        let scope = Scope::child(&self.session.globals());
        let ctx = EvalCtx {
            session: self.session.clone(),
            file: path.to_path_buf(),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: Some(sink.clone()),
        };
        ctx.register_declared_types(&scope);
        eval::eval_block(&chunk.body, &scope, &ctx);

        Ok(sink.take())
    }

    /// The inferred type of a top-level symbol in a file.
    pub fn type_of_symbol(&self, path: &Path, name: &str) -> Option<Ty> {
        let (scope, _) = self.eval_scope(path)?;
        scope.get(name)
    }

    /// The inferred type of an expression evaluated in a file's top-level
    /// scope.
    pub fn type_of_expr(&self, path: &Path, expr: &str) -> Option<Ty> {
        let (scope, ctx) = self.eval_scope(path)?;
        let wrapped = format!("return ({})", expr);
        let chunk = parse(&wrapped).ok()?;
        eval::eval_block(&chunk.body, &scope, &ctx)
    }

    /// Hover documentation for a top-level symbol: the function model's
    /// rendered doc for callables, the display name otherwise.
    pub fn documentation_for(&self, path: &Path, name: &str) -> Option<String> {
        let t = self.type_of_symbol(path, name)?;
        let doc = t.doc.borrow().clone();
        if doc.is_empty() {
            Some(t.name.clone())
        } else {
            Some(doc)
        }
    }

    /// Declaration site of a top-level symbol, for definition lookups.
    pub fn definition_of(&self, path: &Path, name: &str) -> Option<Origin> {
        let (scope, _) = self.eval_scope(path)?;
        let binding = scope.binding(name)?;
        if binding.origin.is_some() {
            return binding.origin;
        }
        binding.ty.and_then(|t| t.origin.borrow().clone())
    }

    /// Names bound at a file's top level, excluding internal `$` tags.
    pub fn symbols(&self, path: &Path) -> Vec<String> {
        let Some((scope, _)) = self.eval_scope(path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = scope
            .local_names()
            .into_iter()
            .filter(|n| !n.starts_with('$') && !n.starts_with('@'))
            .collect();
        names.sort();
        names
    }

    /// Drop a file and everything that depends on it from the module
    /// cache. Call on save.
    pub fn on_file_changed(&self, path: &Path) {
        self.session.invalidate(path);
    }

    /// Always re-execute function bodies so an in-flight edit sees fresh
    /// types.
    pub fn set_live_edit(&self, on: bool) {
        self.session.set_live_edit(on);
    }

    /// Module names available under a directory, for completion.
    pub fn module_names(&self, dir: &Path) -> Vec<String> {
        self.session.module_names(dir)
    }

    fn eval_scope(&self, path: &Path) -> Option<(Rc<Scope>, EvalCtx)> {
        let source = fs::read_to_string(path).ok()?;
        let chunk = parse(&source).ok()?;
        let scope = Scope::child(&self.session.globals());
        let ctx = EvalCtx {
            session: self.session.clone(),
            file: path.to_path_buf(),
            comments: Rc::new(CommentMap::build(&chunk.comments)),
            lints: None,
        };
        ctx.register_declared_types(&scope);
        eval::eval_block(&chunk.body, &scope, &ctx);
        Some((scope, ctx))
    }
}
