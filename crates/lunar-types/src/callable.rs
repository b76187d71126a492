//! The callable seam between the type algebra and the abstract evaluator.
//!
//! A function's *model* (parameter binding rules, body re-execution,
//! memoization) lives in the inference crate; the type algebra only needs
//! to invoke it abstractly and introspect its parameter types. That
//! boundary is this trait.

use crate::ty::Ty;

/// Abstract callable signature attached to `function` types and callable
/// tables.
///
/// Implementations never fail loudly: an invocation whose result cannot
/// be determined returns `None`, and the caller degrades to `any`.
pub trait Callable {
    /// Abstractly invoke with the given argument types, producing the
    /// effective return type if one can be determined.
    fn invoke(&self, args: &[Option<Ty>]) -> Option<Ty>;

    /// Resolved type of the parameter at `index`, if declared.
    fn param_type(&self, _index: usize) -> Option<Ty> {
        None
    }

    /// Documentation text for hover rendering.
    fn doc(&self) -> String {
        String::new()
    }

    /// Raw parameter-list text, e.g. `"(modname: string)"`.
    fn signature(&self) -> Option<String> {
        None
    }
}

/// A host-defined callable: a Rust closure plus declared parameter types.
///
/// Used for the built-in library surface (`type`, `pairs`,
/// `table.insert`, ...), where the return shape is computed from the
/// argument types directly rather than by running a body.
pub struct NativeFn {
    /// Invocation behavior
    #[allow(clippy::type_complexity)]
    pub run: Box<dyn Fn(&[Option<Ty>]) -> Option<Ty>>,
    /// Declared parameter types, by position
    pub params: Vec<Option<Ty>>,
    /// Raw parameter-list text
    pub args: String,
    /// Documentation text
    pub doc: String,
}

impl NativeFn {
    /// A native callable that always yields the same result type.
    pub fn constant(result: Ty, args: impl Into<String>, doc: impl Into<String>) -> NativeFn {
        NativeFn {
            run: Box::new(move |_| Some(result.clone())),
            params: Vec::new(),
            args: args.into(),
            doc: doc.into(),
        }
    }

    /// A native callable computed from its argument types.
    pub fn new(
        run: impl Fn(&[Option<Ty>]) -> Option<Ty> + 'static,
        args: impl Into<String>,
        doc: impl Into<String>,
    ) -> NativeFn {
        NativeFn {
            run: Box::new(run),
            params: Vec::new(),
            args: args.into(),
            doc: doc.into(),
        }
    }

    /// Attach declared parameter types.
    pub fn with_params(mut self, params: Vec<Option<Ty>>) -> NativeFn {
        self.params = params;
        self
    }
}

impl Callable for NativeFn {
    fn invoke(&self, args: &[Option<Ty>]) -> Option<Ty> {
        (self.run)(args)
    }

    fn param_type(&self, index: usize) -> Option<Ty> {
        self.params.get(index).cloned().flatten()
    }

    fn doc(&self) -> String {
        self.doc.clone()
    }

    fn signature(&self) -> Option<String> {
        if self.args.is_empty() {
            None
        } else {
            Some(self.args.clone())
        }
    }
}
