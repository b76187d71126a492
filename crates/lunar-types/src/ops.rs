//! Union, intersection and comparison operators over structural types.
//!
//! These mirror the language's "a table is whatever fields it has"
//! semantics: `union` keeps both a narrow read view (fields every member
//! guarantees) and a permissive value view (fields any member carries),
//! `merge` intersects shapes field-wise, and incompatible basic types
//! collapse to `never`.

use crate::ty::{basic_type, Ty, Type, TypeKind};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Whether two types are interchangeable.
///
/// True for the same reference, or when both resolve to the same
/// canonical basic-type name.
pub fn same_type(a: &Ty, b: &Ty) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    if !a.is_basic() || !b.is_basic() {
        return false;
    }
    match (basic_type(&a.name), basic_type(&b.name)) {
        (Some(ba), Some(bb)) => ba.name == bb.name,
        _ => false,
    }
}

/// Flatten, filter and dedup the member list shared by union and merge.
///
/// `drop_kind` names the absorbed/ignored member kind: `Never` for
/// unions, `Any` for intersections.
fn collect_members(types: &[Option<Ty>], drop_kind: TypeKind) -> Vec<Ty> {
    let mut members: Vec<Ty> = Vec::new();
    let mut push = |t: &Ty, members: &mut Vec<Ty>| {
        if t.kind == drop_kind {
            return;
        }
        if !members.iter().any(|m| Rc::ptr_eq(m, t) || same_type(m, t)) {
            members.push(t.clone());
        }
    };
    for ty in types.iter().flatten() {
        if ty.kind == TypeKind::Union && !ty.variants.is_empty() {
            for v in &ty.variants {
                push(v, &mut members);
            }
        } else {
            push(ty, &mut members);
        }
    }
    members
}

/// Union of types: `T1 | T2 | ... | Tn`.
///
/// `never` members are dropped; `any` absorbs the whole union; a single
/// surviving member is returned as-is. Otherwise the result is a union
/// whose read view (its own field map) is the *intersection* of member
/// field sets and whose [`Type::value_view`] carries the permissive
/// union of all fields. Fields present in several members with differing
/// types recurse through `union_types`; recursion terminates because
/// field depth is bounded by the source annotation or literal depth.
pub fn union_types(types: &[Option<Ty>]) -> Ty {
    let members = collect_members(types, TypeKind::Never);

    if members.is_empty() {
        return Type::never();
    }
    if members.len() == 1 {
        return members[0].clone();
    }
    if members.iter().any(|m| m.is_any()) {
        return Type::any();
    }

    let mut read: FxHashMap<String, Ty> = FxHashMap::default();
    let mut value: FxHashMap<String, Ty> = FxHashMap::default();
    let mut elements: Vec<Option<Ty>> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for (i, m) in members.iter().enumerate() {
        let fields = m.fields.borrow();
        if !m.name.is_empty() {
            names.push(m.name.clone());
        }
        if let Some(e) = m.element() {
            elements.push(Some(e));
        }

        if i == 0 {
            read = fields.clone();
            value = fields.clone();
            continue;
        }

        // Value view: keep every field; divergent types union recursively.
        for (k, t) in fields.iter() {
            if k.starts_with('$') {
                continue;
            }
            match value.get(k) {
                Some(prev) if !same_type(prev, t) => {
                    let merged = union_types(&[Some(prev.clone()), Some(t.clone())]);
                    value.insert(k.clone(), merged);
                }
                Some(_) => {}
                None => {
                    value.insert(k.clone(), t.clone());
                }
            }
        }

        // Read view: only fields every member carries survive.
        read.retain(|k, _| k.starts_with('$') || fields.contains_key(k));
        for (k, slot) in read.iter_mut() {
            if !k.starts_with('$') {
                if let Some(t) = value.get(k) {
                    *slot = t.clone();
                }
            }
        }
    }

    let element = if elements.is_empty() {
        None
    } else {
        Some(union_types(&elements))
    };
    let name = names.join(" | ");

    let value_view = Type::union_shell(
        name.clone(),
        members.clone(),
        value,
        element.clone(),
        None,
    );
    Type::union_shell(name, members, read, element, Some(value_view))
}

/// Intersection of types: `T1 & T2 & ... & Tn`.
///
/// `any` members are dropped (they constrain nothing); if everything was
/// `any` the result is `any`. An empty operand list yields `never`, but a
/// non-empty list whose members all failed to resolve degrades to `any`
/// rather than poisoning later assignments. A surviving `never` or basic
/// member makes the whole intersection `never`, incompatible primitives
/// cannot intersect. Otherwise table shapes merge field-wise, recursing
/// for fields present in more than one member.
pub fn merge_types(types: &[Option<Ty>]) -> Ty {
    if types.is_empty() {
        return Type::never();
    }
    if types.iter().all(|t| t.is_none()) {
        return Type::any();
    }

    let members = collect_members(types, TypeKind::Any);

    if members.is_empty() {
        return Type::any();
    }
    if members.len() == 1 {
        return members[0].clone();
    }
    if members.iter().any(|m| m.is_never() || m.is_basic()) {
        return Type::never();
    }

    let mut fields: FxHashMap<String, Ty> = FxHashMap::default();
    let mut elements: Vec<Option<Ty>> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for (i, m) in members.iter().enumerate() {
        let mf = m.fields.borrow();
        if !m.name.is_empty() {
            names.push(m.name.clone());
        }
        if let Some(e) = m.element() {
            elements.push(Some(e));
        }

        if i == 0 {
            fields = mf.clone();
            continue;
        }
        for (k, t) in mf.iter() {
            if k.starts_with('$') {
                continue;
            }
            match fields.get(k) {
                Some(prev) if !same_type(prev, t) => {
                    let merged = merge_types(&[Some(prev.clone()), Some(t.clone())]);
                    fields.insert(k.clone(), merged);
                }
                Some(_) => {}
                None => {
                    fields.insert(k.clone(), t.clone());
                }
            }
        }
    }

    // "{ a } & { b }" reads better as "{ a, b }".
    let name = names.join(" & ").replace("} & {", ",");

    let ty = Type::declared_table(name, fields);
    if !elements.is_empty() {
        *ty.element.borrow_mut() = Some(merge_types(&elements));
    }
    ty
}

/// `map<T>`: a table whose wildcard field and element type are both `T`.
pub fn map_of(name: &str, value: Ty) -> Ty {
    let display = if value.name.is_empty() {
        name.to_string()
    } else {
        format!("map<{}>", value.name)
    };
    let mut shell = Type::empty(TypeKind::Map, display);
    shell.readonly = true;
    shell.fields.borrow_mut().insert("*".to_string(), value.clone());
    *shell.element.borrow_mut() = Some(value);
    Rc::new(shell)
}

/// `T[]`: an array of `T`.
pub fn arr_of(name: &str, element: Ty) -> Ty {
    let display = if element.name.is_empty() {
        name.to_string()
    } else {
        format!("{}[]", element.name)
    };
    let mut shell = Type::empty(TypeKind::Array, display);
    shell.readonly = true;
    *shell.element.borrow_mut() = Some(element);
    Rc::new(shell)
}

/// Re-tag a resolved type with the display name it was reached through.
///
/// Basic and declared (readonly) types are returned as-is. Inferred
/// shapes are shallow-copied — the field map is cloned so downstream
/// mutation cannot corrupt the source, but the field *values* stay
/// shared — and become readonly under the new name (except the open
/// `table`/`object` names, which stay writable).
pub fn named_type(name: &str, ty: Ty) -> Ty {
    if ty.is_basic() || ty.readonly {
        return ty;
    }
    let mut copy = (*ty).clone();
    copy.name = name.to_string();
    copy.readonly = name != "table" && name != "object";
    *copy.doc.borrow_mut() = String::new();
    Rc::new(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::basic_type;

    fn table_with(fields: &[(&str, &str)]) -> Ty {
        let t = Type::table();
        for (k, v) in fields {
            t.set_field(*k, basic_type(v).unwrap());
        }
        t
    }

    #[test]
    fn test_union_identity() {
        let num = basic_type("number").unwrap();
        let u = union_types(&[Some(num.clone())]);
        assert!(Rc::ptr_eq(&u, &num));
    }

    #[test]
    fn test_union_drops_never() {
        let num = basic_type("number").unwrap();
        let u = union_types(&[Some(num.clone()), Some(Type::never())]);
        assert!(Rc::ptr_eq(&u, &num));
    }

    #[test]
    fn test_union_any_absorbs() {
        let u = union_types(&[
            Some(basic_type("number").unwrap()),
            Some(Type::any()),
            Some(basic_type("string").unwrap()),
        ]);
        assert!(u.is_any());
    }

    #[test]
    fn test_union_of_empty_is_never() {
        assert!(union_types(&[]).is_never());
        assert!(union_types(&[None, None]).is_never());
    }

    #[test]
    fn test_union_read_and_value_views() {
        let a = table_with(&[("x", "number"), ("y", "string")]);
        let b = table_with(&[("x", "number")]);
        let u = union_types(&[Some(a), Some(b)]);

        // Read view: only `x` is guaranteed by every member.
        assert!(u.field("x").is_some());
        assert!(u.field("y").is_none());

        // Value view: `y` is reachable permissively.
        let vv = u.value_view.as_ref().unwrap();
        assert!(vv.field("x").is_some());
        assert!(vv.field("y").is_some());
    }

    #[test]
    fn test_union_divergent_field_unions() {
        let a = table_with(&[("v", "number")]);
        let b = table_with(&[("v", "string")]);
        let u = union_types(&[Some(a), Some(b)]);

        let v = u.field("v").unwrap();
        assert_eq!(v.kind, TypeKind::Union);
        assert_eq!(v.variants.len(), 2);
    }

    #[test]
    fn test_union_flattens_nested() {
        let num = basic_type("number").unwrap();
        let s = basic_type("string").unwrap();
        let inner = union_types(&[Some(num), Some(s)]);
        let b = basic_type("boolean").unwrap();
        let outer = union_types(&[Some(inner), Some(b)]);
        assert_eq!(outer.variants.len(), 3);
    }

    #[test]
    fn test_merge_empty_is_never() {
        assert!(merge_types(&[]).is_never());
    }

    #[test]
    fn test_merge_all_unresolved_is_any() {
        // Unknown names in an intersection degrade to any instead of
        // poisoning every later assignment with never.
        assert!(merge_types(&[None, None]).is_any());
        assert!(merge_types(&[None]).is_any());
    }

    #[test]
    fn test_merge_identity() {
        let t = table_with(&[("x", "number")]);
        let m = merge_types(&[Some(t.clone())]);
        assert!(Rc::ptr_eq(&m, &t));
    }

    #[test]
    fn test_merge_basics_is_never() {
        let m = merge_types(&[
            Some(basic_type("string").unwrap()),
            Some(basic_type("number").unwrap()),
        ]);
        assert!(m.is_never());
    }

    #[test]
    fn test_merge_tables_unions_fields() {
        let a = table_with(&[("a", "number")]);
        let b = table_with(&[("b", "string")]);
        let m = merge_types(&[Some(a), Some(b)]);
        assert_eq!(m.field("a").unwrap().name(), "number");
        assert_eq!(m.field("b").unwrap().name(), "string");
    }

    #[test]
    fn test_merge_drops_any() {
        let t = table_with(&[("a", "number")]);
        let m = merge_types(&[Some(Type::any()), Some(t.clone())]);
        assert!(Rc::ptr_eq(&m, &t));

        assert!(merge_types(&[Some(Type::any()), Some(Type::any())]).is_any());
    }

    #[test]
    fn test_map_of() {
        let m = map_of("map<string>", basic_type("string").unwrap());
        assert_eq!(m.name(), "map<string>");
        assert_eq!(m.field("*").unwrap().name(), "string");
        assert_eq!(m.element().unwrap().name(), "string");
    }

    #[test]
    fn test_arr_of() {
        let a = arr_of("number[]", basic_type("number").unwrap());
        assert_eq!(a.name(), "number[]");
        assert_eq!(a.element().unwrap().name(), "number");
        assert!(a.field("x").is_none());
    }

    #[test]
    fn test_named_type_copies_fields() {
        let t = table_with(&[("x", "number")]);
        let n = named_type("Point", t.clone());
        assert_eq!(n.name(), "Point");
        assert!(n.readonly);

        // Mutating the copy must not leak into the source.
        n.set_field("y", basic_type("string").unwrap());
        assert!(t.field("y").is_none());
    }

    #[test]
    fn test_named_type_passthrough() {
        let num = basic_type("number").unwrap();
        assert!(Rc::ptr_eq(&named_type("n", num.clone()), &num));
    }

    #[test]
    fn test_same_type_by_basic_name() {
        let a = basic_type("number").unwrap();
        let b = basic_type("integer").unwrap(); // alias resolves to number
        assert!(same_type(&a, &b));
        assert!(!same_type(&a, &basic_type("string").unwrap()));
    }
}
