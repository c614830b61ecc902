//! Definition building and registry validation.

use crate::{registry, SIMPLE};
use pretty_assertions::assert_eq;
use worksheets::{Definition, DefinitionError, Field, FieldType, Registry};

#[test]
fn test_zero_index_rejected() {
    let mut def = Definition::new("simple");
    let err = def
        .add_field(Field::new(0, "name", FieldType::Text))
        .unwrap_err();
    assert!(matches!(err, DefinitionError::ZeroIndex { .. }));
    assert!(def.field("name").is_none());
}

#[test]
fn test_duplicates_leave_first_field_intact() {
    let mut def = Definition::new("simple");
    def.add_field(Field::new(1, "name", FieldType::Text)).unwrap();

    let err = def
        .add_field(Field::new(1, "other", FieldType::Bool))
        .unwrap_err();
    assert_eq!(
        err,
        DefinitionError::DuplicateIndex {
            definition: "simple".into(),
            index: 1
        }
    );

    let err = def
        .add_field(Field::new(2, "name", FieldType::Bool))
        .unwrap_err();
    assert_eq!(
        err,
        DefinitionError::DuplicateName {
            definition: "simple".into(),
            name: "name".into()
        }
    );

    let name = def.field("name").unwrap();
    assert_eq!(name.index().get(), 1);
    assert_eq!(name.field_type(), &FieldType::Text);
    assert!(def.field("other").is_none());
}

#[test]
fn test_cycle_prevents_registration() {
    let source = r#"
        worksheet loop {
          1:a number(0) computed_by { return c + 1 }
          2:b number(0) computed_by { return a + 1 }
          3:c number(0) computed_by { return b + 1 }
          4:d number(0)
        }
    "#;
    let err = Registry::from_source(source).unwrap_err();
    assert_eq!(
        err,
        DefinitionError::CyclicDependency {
            definition: "loop".into(),
            fields: vec!["a".into(), "b".into(), "c".into()],
        }
    );
}

#[test]
fn test_self_reference_is_a_cycle() {
    let err = Registry::from_source("worksheet s { 1:a number(0) computed_by { a } }")
        .unwrap_err();
    assert!(matches!(err, DefinitionError::CyclicDependency { .. }));
}

#[test]
fn test_unknown_selector_rejected() {
    let err = Registry::from_source("worksheet s { 1:a number(0) computed_by { b * 2 } }")
        .unwrap_err();
    assert_eq!(
        err,
        DefinitionError::UnknownSelectorField {
            definition: "s".into(),
            field: "a".into(),
            selector: "b".into(),
        }
    );
}

#[test]
fn test_registry_lists_fields() {
    let registry = registry(SIMPLE);
    let def = registry.definition("simple").unwrap();

    let names: Vec<&str> = def.fields().map(|f| f.name()).collect();
    assert_eq!(names, vec!["id", "version", "name", "age"]);

    let business: Vec<&str> = def.business_fields().map(|f| f.name()).collect();
    assert_eq!(business, vec!["name", "age"]);

    assert!(matches!(
        registry.new_worksheet("missing"),
        Err(DefinitionError::UnknownDefinition(name)) if name == "missing"
    ));
}
