//! Lexical scope chain for abstract evaluation.
//!
//! Each frame owns its bindings; lookup walks the parent chain. Frames
//! are shared via `Rc` because function models capture their defining
//! scope and may be invoked long after the block that created it was
//! evaluated.

use lunar_types::{Origin, Ty};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A name bound in a scope frame.
///
/// `ty` is `None` for names that are declared but whose type could not be
/// determined; such a binding still shadows outer frames. This keeps
/// "doesn't exist" distinguishable from "exists with unknown type".
#[derive(Debug, Clone, Default)]
pub struct Binding {
    /// Resolved type, if known
    pub ty: Option<Ty>,
    /// Declaration site
    pub origin: Option<Origin>,
}

/// One frame in the scope chain.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    vars: RefCell<FxHashMap<String, Binding>>,
}

impl Scope {
    /// A root frame with no parent.
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    /// A child frame of `parent`.
    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(parent.clone()),
            vars: RefCell::new(FxHashMap::default()),
        })
    }

    /// Resolve `name` against this frame and its ancestors.
    pub fn get(&self, name: &str) -> Option<Ty> {
        let mut frame = self;
        loop {
            if let Some(b) = frame.vars.borrow().get(name) {
                return b.ty.clone();
            }
            match &frame.parent {
                Some(p) => frame = p,
                None => return None,
            }
        }
    }

    /// Full binding lookup, including the declaration site.
    pub fn binding(&self, name: &str) -> Option<Binding> {
        let mut frame = self;
        loop {
            if let Some(b) = frame.vars.borrow().get(name) {
                return Some(b.clone());
            }
            match &frame.parent {
                Some(p) => frame = p,
                None => return None,
            }
        }
    }

    /// Whether `name` is bound anywhere on the chain.
    pub fn contains(&self, name: &str) -> bool {
        let mut frame = self;
        loop {
            if frame.vars.borrow().contains_key(name) {
                return true;
            }
            match &frame.parent {
                Some(p) => frame = p,
                None => return false,
            }
        }
    }

    /// Declare `name` in this frame, shadowing any outer binding.
    pub fn bind(&self, name: impl Into<String>, ty: Option<Ty>) {
        self.vars
            .borrow_mut()
            .insert(name.into(), Binding { ty, origin: None });
    }

    /// Declare `name` in this frame with a declaration site.
    pub fn bind_at(&self, name: impl Into<String>, ty: Option<Ty>, origin: Option<Origin>) {
        self.vars
            .borrow_mut()
            .insert(name.into(), Binding { ty, origin });
    }

    /// Assign to an existing binding wherever it lives on the chain;
    /// unbound names become globals in the root frame.
    pub fn assign(&self, name: &str, ty: Option<Ty>) {
        let mut frame = self;
        loop {
            if frame.vars.borrow().contains_key(name) {
                if let Some(b) = frame.vars.borrow_mut().get_mut(name) {
                    b.ty = ty;
                }
                return;
            }
            match &frame.parent {
                Some(p) => frame = p,
                None => {
                    frame.bind(name, ty);
                    return;
                }
            }
        }
    }

    /// Names bound directly in this frame.
    pub fn local_names(&self) -> Vec<String> {
        self.vars.borrow().keys().cloned().collect()
    }
}
