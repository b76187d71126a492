//! Lunar Type Algebra
//!
//! The structural type value representation shared by every stage of the
//! analyzer, together with the union/merge/compare operators over it.
//!
//! A [`Ty`] is a reference-counted, structurally described value shape: an
//! open field map for tables, an element type for arrays and maps, an
//! optional callable signature, and a variant set for unions. Basic types
//! (`string`, `number`, ...) are canonical by *name*: two basic types with
//! the same name are interchangeable regardless of object identity.
//!
//! The analyzer is single-threaded (one analysis session per thread), so
//! types are `Rc`-shared rather than interned in a global arena.
//!
//! # Usage
//!
//! ```
//! use lunar_types::{basic_type, union_types, Ty};
//!
//! let num = basic_type("number").unwrap();
//! let s = basic_type("string").unwrap();
//! let u = union_types(&[Some(num), Some(s)]);
//! assert_eq!(u.name(), "number | string");
//! ```

#![warn(missing_docs)]

pub mod callable;
pub mod ops;
pub mod ty;

pub use callable::{Callable, NativeFn};
pub use ops::{arr_of, map_of, merge_types, named_type, same_type, union_types};
pub use ty::{basic_type, BasicType, Origin, Ty, Type, TypeKind};
