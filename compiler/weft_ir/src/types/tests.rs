use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn value_types_are_not_refcounted() {
    assert!(!Type::Value(PrimType::Int).is_refcounted());
    assert!(Type::Future(PrimType::Int).is_refcounted());
    assert!(Type::array(PrimType::Int, Type::Future(PrimType::String)).is_refcounted());
    assert!(Type::ref_to(Type::Future(PrimType::Int)).is_refcounted());
    assert!(Type::Updateable(PrimType::Float).is_refcounted());
}

#[test]
fn fetched_types() {
    assert_eq!(
        Type::Future(PrimType::Float).fetched(),
        Some(Type::Value(PrimType::Float))
    );
    let target = Type::array(PrimType::Int, Type::Future(PrimType::Int));
    assert_eq!(Type::ref_to(target.clone()).fetched(), Some(target));
    assert_eq!(Type::bag(Type::Future(PrimType::Int)).fetched(), None);
}

#[test]
fn ref_to_matches_exact_target() {
    let int_fut = Type::Future(PrimType::Int);
    let r = Type::ref_to(int_fut.clone());
    assert!(r.is_ref_to(&int_fut));
    assert!(!r.is_ref_to(&Type::Future(PrimType::Float)));
    assert!(!int_fut.is_ref_to(&int_fut));
}

#[test]
fn struct_field_lookup() {
    let st = Type::Struct(Arc::new(StructType {
        name: Name::new("point"),
        fields: vec![
            (Name::new("x"), Type::Future(PrimType::Int)),
            (Name::new("y"), Type::Future(PrimType::Float)),
        ],
    }));
    assert_eq!(
        st.field(&Name::new("y")),
        Some(&Type::Future(PrimType::Float))
    );
    assert_eq!(st.field(&Name::new("z")), None);
    assert_eq!(
        Type::structure(
            "point",
            vec![
                (Name::new("x"), Type::Future(PrimType::Int)),
                (Name::new("y"), Type::Future(PrimType::Float)),
            ]
        ),
        st
    );
}

#[test]
fn display_forms() {
    assert_eq!(Type::Future(PrimType::Int).to_string(), "int");
    assert_eq!(Type::Value(PrimType::Bool).to_string(), "$boolean");
    assert_eq!(
        Type::array(PrimType::Int, Type::Future(PrimType::String)).to_string(),
        "string[int]"
    );
    assert_eq!(
        Type::ref_to(Type::Future(PrimType::Int)).to_string(),
        "*(int)"
    );
}
