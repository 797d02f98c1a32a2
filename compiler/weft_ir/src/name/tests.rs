use super::*;

#[test]
fn test_name_eq_by_content() {
    assert_eq!(Name::new("x"), Name::from("x"));
    assert_eq!(Name::new("x"), Name::from(String::from("x")));
    assert_ne!(Name::new("x"), Name::new("y"));
}

#[test]
fn test_name_hash_lookup_by_str() {
    let mut set = rustc_hash::FxHashSet::default();
    set.insert(Name::new("a"));
    set.insert(Name::new("a")); // duplicate
    set.insert(Name::new("b"));
    assert_eq!(set.len(), 2);
    assert!(set.contains("a"));
}

#[test]
fn test_name_derivations() {
    let i = Name::new("i");
    assert_eq!(i.with_suffix("@2").as_str(), "i@2");
    assert_eq!(i.with_prefix("__v:").as_str(), "__v:i");
}

#[test]
fn test_name_ord() {
    assert!(Name::new("a") < Name::new("b"));
}
