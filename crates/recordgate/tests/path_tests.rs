//! Field-path resolution against real record types.

mod common;

use common::*;
use recordgate::path::{FieldPath, PathExpr, resolve};
use recordgate::query::{Criteria, Update};

#[test]
fn test_nested_member_path() {
    assert_eq!(Person::ADDRESS.then(Address::CITY).resolve(), "Address.City");
}

#[test]
fn test_collection_paths_absolute_and_relative() {
    assert_eq!(
        Person::CHILDREN.member().then(Child::LAST_NAME).resolve(),
        "Children.LastName"
    );
    assert_eq!(
        Person::CHILDREN.relative().then(Child::LAST_NAME).resolve(),
        "LastName"
    );
}

#[test]
fn test_single_member_and_root() {
    assert_eq!(Person::LAST_NAME.path().resolve(), "LastName");
    assert_eq!(FieldPath::<Person, Person>::root().resolve(), "");
}

#[test]
fn test_non_member_expression_resolves_empty() {
    assert_eq!(resolve(&PathExpr::constant("LastName")), "");
    assert_eq!(resolve(&PathExpr::constant(1).member("x")), "");
}

#[test]
fn test_builders_reject_empty_paths() {
    let root = FieldPath::<Person, Person>::root();
    let err = Criteria::new().eq(&root, 1).to_document().unwrap_err();
    assert!(err.is_invalid_argument());

    let err = Update::new()
        .set(PathExpr::constant(0), 1)
        .to_document()
        .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_paths_flow_into_documents() {
    let criteria = Criteria::new()
        .eq(Person::ADDRESS.then(Address::ZIP), "W1")
        .gte(Person::AGE, 30);
    assert_eq!(
        serde_json::Value::Object(criteria.to_document().unwrap()),
        serde_json::json!({"Address.Zip": "W1", "Age": {"$gte": 30}})
    );
}
