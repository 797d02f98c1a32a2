use super::*;

#[test]
fn constructors_pick_storage() {
    let f = Var::future("x", PrimType::Int);
    assert_eq!(f.storage, Storage::Stack);
    assert!(f.is_refcounted());

    let v = Var::value("v", PrimType::Int);
    assert_eq!(v.storage, Storage::Local);
    assert!(!v.is_refcounted());

    let t = Var::temp("t", Type::Value(PrimType::Float));
    assert_eq!(t.storage, Storage::Local);
    assert_eq!(t.def, DefKind::LocalCompiler);

    let t = Var::temp("t", Type::Future(PrimType::Float));
    assert_eq!(t.storage, Storage::Temp);
}

#[test]
fn mapping_and_rename() {
    let f = Var::new(
        "out",
        Type::Future(PrimType::File),
        Storage::Stack,
        DefKind::OutArg,
    )
    .with_mapping("path");
    assert!(f.is_mapped());

    let g = f.renamed(Name::new("out2"));
    assert_eq!(g.name.as_str(), "out2");
    assert_eq!(g.mapping, Some(Name::new("path")));
    assert_eq!(g.def, DefKind::OutArg);
}

#[test]
fn display_is_name() {
    assert_eq!(Var::future("abc", PrimType::Int).to_string(), "abc");
}
