//! Core type definitions for the Lunar type system

use crate::callable::Callable;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Shared handle to a structural type value.
///
/// Types are cheap to share: a single `Ty` may appear in many scope
/// bindings and module namespaces at once. Field maps use interior
/// mutability so a table can grow while the chunk defining it is still
/// being evaluated; once a type has been cached it is never mutated again
/// (invalidation replaces the whole entry).
pub type Ty = Rc<Type>;

/// Primitive value kinds of the language.
///
/// These are the names accepted by annotation leaves and produced by the
/// `type()` builtin. `table` and `function` are structural kinds and are
/// not listed here; the lattice bounds `any`/`never` have their own
/// [`TypeKind`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicType {
    /// The `string` type
    String,
    /// The `number` type
    Number,
    /// The `boolean` type
    Boolean,
    /// The `nil` type
    Nil,
    /// The `thread` type (coroutines)
    Thread,
    /// The `userdata` type (host objects)
    Userdata,
}

impl BasicType {
    /// Canonical display name
    pub fn type_name(&self) -> &'static str {
        match self {
            BasicType::String => "string",
            BasicType::Number => "number",
            BasicType::Boolean => "boolean",
            BasicType::Nil => "nil",
            BasicType::Thread => "thread",
            BasicType::Userdata => "userdata",
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Structural kind of a type value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Top type: absorbs unions, assignable from anything
    Any,
    /// Bottom type: filtered out of composites during construction
    Never,
    /// Primitive type (string, number, boolean, nil, thread, userdata)
    Basic(BasicType),
    /// Open table shape described entirely by its field map
    Table,
    /// Callable value
    Function,
    /// Union of member types
    Union,
    /// Array: homogeneous integer-indexed table
    Array,
    /// Map: homogeneous string-keyed table (`map<T>`)
    Map,
}

/// Where a type was declared: used for documentation and definition
/// lookups, never for equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Source file the declaration lives in
    pub file: PathBuf,
    /// 1-based start line
    pub line: u32,
    /// 0-based start column
    pub column: u32,
}

/// The structural type value.
///
/// Construction goes through the helpers on this type and through
/// [`crate::ops`]; the invariants (`never` filtered out of composites,
/// `any` absorbing unions) are maintained there, not re-checked here.
pub struct Type {
    /// Structural kind
    pub kind: TypeKind,
    /// Display name (`"number"`, `"{ x: number }"`, `"A | B"`, ...)
    pub name: String,
    /// Named fields (the `.` map). Keys starting with `$` are internal
    /// markers (request/result overrides, origin tags) and are skipped by
    /// the union/merge operators.
    pub fields: RefCell<FxHashMap<String, Ty>>,
    /// Element type for arrays, maps and typed table parts (the `[]` slot)
    pub element: RefCell<Option<Ty>>,
    /// Callable signature, for functions and callable tables. Compared by
    /// pointer identity only.
    pub call: Option<Rc<dyn Callable>>,
    /// Union members; empty unless `kind == Union`
    pub variants: Vec<Ty>,
    /// Permissive view of a union: field map is the union of every
    /// member's fields rather than the intersection. Callers that only
    /// need *some* member to carry the field read through this.
    pub value_view: Option<Ty>,
    /// Indexable fallback consulted after direct field lookup fails
    /// (models the `__index` metatable convention, nothing more).
    pub index_fallback: RefCell<Option<Ty>>,
    /// Declared (annotated) shapes are readonly: they are not widened by
    /// inference and missing-member access on them is diagnosed.
    pub readonly: bool,
    /// Accumulated documentation text
    pub doc: RefCell<String>,
    /// Declaration site; excluded from equality
    pub origin: RefCell<Option<Origin>>,
}

impl Clone for Type {
    /// Shallow structural copy: the field map is cloned, the field
    /// values, callable and variants stay shared.
    fn clone(&self) -> Type {
        Type {
            kind: self.kind,
            name: self.name.clone(),
            fields: RefCell::new(self.fields.borrow().clone()),
            element: RefCell::new(self.element.borrow().clone()),
            call: self.call.clone(),
            variants: self.variants.clone(),
            value_view: self.value_view.clone(),
            index_fallback: RefCell::new(self.index_fallback.borrow().clone()),
            readonly: self.readonly,
            doc: RefCell::new(self.doc.borrow().clone()),
            origin: RefCell::new(self.origin.borrow().clone()),
        }
    }
}

impl Type {
    pub(crate) fn empty(kind: TypeKind, name: impl Into<String>) -> Type {
        Type {
            kind,
            name: name.into(),
            fields: RefCell::new(FxHashMap::default()),
            element: RefCell::new(None),
            call: None,
            variants: Vec::new(),
            value_view: None,
            index_fallback: RefCell::new(None),
            readonly: false,
            doc: RefCell::new(String::new()),
            origin: RefCell::new(None),
        }
    }

    /// The `any` type
    pub fn any() -> Ty {
        Rc::new(Type {
            readonly: true,
            ..Type::empty(TypeKind::Any, "any")
        })
    }

    /// The `never` type
    pub fn never() -> Ty {
        Rc::new(Type {
            readonly: true,
            ..Type::empty(TypeKind::Never, "never")
        })
    }

    /// A canonical primitive type
    pub fn basic(basic: BasicType) -> Ty {
        Rc::new(Type {
            readonly: true,
            ..Type::empty(TypeKind::Basic(basic), basic.type_name())
        })
    }

    /// A fresh open (inferred, writable) table shape
    pub fn table() -> Ty {
        Rc::new(Type::empty(TypeKind::Table, "table"))
    }

    /// A table shape with the given fields and display name
    pub fn table_with(name: impl Into<String>, fields: FxHashMap<String, Ty>) -> Ty {
        Rc::new(Type {
            fields: RefCell::new(fields),
            ..Type::empty(TypeKind::Table, name)
        })
    }

    /// A declared (readonly) table shape
    pub fn declared_table(name: impl Into<String>, fields: FxHashMap<String, Ty>) -> Ty {
        Rc::new(Type {
            fields: RefCell::new(fields),
            readonly: true,
            ..Type::empty(TypeKind::Table, name)
        })
    }

    /// A bare `function` type with no known signature
    pub fn function() -> Ty {
        Rc::new(Type {
            readonly: true,
            ..Type::empty(TypeKind::Function, "function")
        })
    }

    /// A callable type wrapping the given signature model
    pub fn callable(call: Rc<dyn Callable>) -> Ty {
        Rc::new(Type {
            call: Some(call),
            readonly: true,
            ..Type::empty(TypeKind::Function, "function")
        })
    }

    /// Union shell used by [`crate::ops::union_types`]
    pub(crate) fn union_shell(
        name: String,
        variants: Vec<Ty>,
        fields: FxHashMap<String, Ty>,
        element: Option<Ty>,
        value_view: Option<Ty>,
    ) -> Ty {
        Rc::new(Type {
            fields: RefCell::new(fields),
            element: RefCell::new(element),
            variants,
            value_view,
            readonly: true,
            ..Type::empty(TypeKind::Union, name)
        })
    }

    /// Whether this is one of the canonical basic types (including the
    /// lattice bounds)
    pub fn is_basic(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Any | TypeKind::Never | TypeKind::Basic(_)
        )
    }

    /// Whether this is the `any` type
    pub fn is_any(&self) -> bool {
        self.kind == TypeKind::Any
    }

    /// Whether this is the `never` type
    pub fn is_never(&self) -> bool {
        self.kind == TypeKind::Never
    }

    /// Whether this type can be called
    pub fn is_callable(&self) -> bool {
        self.call.is_some() || self.kind == TypeKind::Function
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime kind name, as the `type()` builtin would report it
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TypeKind::Any => "any",
            TypeKind::Never => "never",
            TypeKind::Basic(b) => b.type_name(),
            TypeKind::Table | TypeKind::Array | TypeKind::Map => "table",
            TypeKind::Function => "function",
            TypeKind::Union => "table",
        }
    }

    /// Field lookup on the `.` map
    pub fn field(&self, key: &str) -> Option<Ty> {
        self.fields.borrow().get(key).cloned()
    }

    /// Insert a field into the `.` map
    pub fn set_field(&self, key: impl Into<String>, ty: Ty) {
        self.fields.borrow_mut().insert(key.into(), ty);
    }

    /// Element type (the `[]` slot)
    pub fn element(&self) -> Option<Ty> {
        self.element.borrow().clone()
    }

    /// Member access with the standard fallback order: exact field, then
    /// the `*` wildcard field, then the indexable fallback.
    pub fn member(&self, key: &str) -> Option<Ty> {
        if let Some(t) = self.field(key) {
            return Some(t);
        }
        if let Some(t) = self.field("*") {
            return Some(t);
        }
        let fallback = self.index_fallback.borrow().clone();
        fallback.and_then(|t| t.member(key))
    }

    /// Record the declaration site
    pub fn set_origin(&self, origin: Origin) {
        *self.origin.borrow_mut() = Some(origin);
    }

    /// Append documentation text
    pub fn set_doc(&self, doc: impl Into<String>) {
        *self.doc.borrow_mut() = doc.into();
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("readonly", &self.readonly)
            .field("fields", &self.fields.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            TypeKind::Any | TypeKind::Never | TypeKind::Basic(_) => true,
            // Structural comparison; origin, doc and callables are not
            // part of a type's identity.
            _ => {
                self.name == other.name
                    && self.variants == other.variants
                    && *self.element.borrow() == *other.element.borrow()
                    && *self.fields.borrow() == *other.fields.borrow()
            }
        }
    }
}

impl Eq for Type {}

/// Resolve a basic-type keyword to its canonical type.
///
/// Accepts the primitive names, the lattice bounds, and the bare
/// structural keywords `table`/`object` and `function`. Returns `None`
/// for anything else.
pub fn basic_type(name: &str) -> Option<Ty> {
    let ty = match name.trim() {
        "any" => Type::any(),
        "never" => Type::never(),
        "nil" | "null" => Type::basic(BasicType::Nil),
        "string" => Type::basic(BasicType::String),
        "number" | "integer" => Type::basic(BasicType::Number),
        "boolean" => Type::basic(BasicType::Boolean),
        "thread" => Type::basic(BasicType::Thread),
        "userdata" | "cdata" => Type::basic(BasicType::Userdata),
        "table" | "object" => Type::table(),
        "function" => Type::function(),
        _ => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_display() {
        assert_eq!(format!("{}", BasicType::Number), "number");
        assert_eq!(format!("{}", BasicType::Nil), "nil");
    }

    #[test]
    fn test_basic_type_lookup() {
        assert_eq!(basic_type("number").unwrap().name(), "number");
        assert_eq!(basic_type("null").unwrap().name(), "nil");
        assert!(basic_type("number").unwrap().is_basic());
        assert!(basic_type("frobnicate").is_none());
    }

    #[test]
    fn test_basic_equality_by_name() {
        // Two separately constructed basics with the same name compare
        // equal: identity is irrelevant for canonical basics.
        let a = basic_type("string").unwrap();
        let b = basic_type("string").unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_ne!(basic_type("string").unwrap(), basic_type("number").unwrap());
    }

    #[test]
    fn test_member_fallback_order() {
        let t = Type::table();
        t.set_field("x", basic_type("number").unwrap());
        t.set_field("*", basic_type("string").unwrap());

        assert_eq!(t.member("x").unwrap().name(), "number");
        assert_eq!(t.member("y").unwrap().name(), "string");
    }

    #[test]
    fn test_index_fallback() {
        let base = Type::table();
        base.set_field("inherited", basic_type("boolean").unwrap());

        let t = Type::table();
        *t.index_fallback.borrow_mut() = Some(base);

        assert_eq!(t.member("inherited").unwrap().name(), "boolean");
        assert!(t.member("missing").is_none());
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(Type::table().kind_name(), "table");
        assert_eq!(Type::function().kind_name(), "function");
        assert_eq!(Type::any().kind_name(), "any");
    }
}
