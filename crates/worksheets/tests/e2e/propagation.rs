//! Recompute and constraint behaviour of mutations.

use crate::{registry, snapshot, DIVISION, ORDERS};
use pretty_assertions::assert_eq;
use worksheets::{EvaluationError, MutationError, Value};

#[test]
fn test_set_updates_computed_field() {
    let registry = registry(ORDERS);
    let mut order = registry.new_worksheet("order").unwrap();

    order.set("price", Value::number(1999, 2)).unwrap();
    assert_eq!(order.get("total").unwrap(), &Value::Undefined);

    order.set("qty", 2).unwrap();
    assert_eq!(order.get("total").unwrap().to_string(), "39.98");

    order.set("price", 5).unwrap();
    assert_eq!(order.get("total").unwrap().to_string(), "10.00");
}

#[test]
fn test_constraint_rejection_restores_every_field() {
    let registry = registry(ORDERS);
    let mut order = registry.new_worksheet("order").unwrap();
    order.set("budget", 100).unwrap();
    order.set("price", 30).unwrap();
    order.set("qty", 3).unwrap();
    let before = snapshot(&order);
    let dirty_before = order.dirty_fields().clone();

    let err = order.set("qty", 4).unwrap_err();

    assert_eq!(err, MutationError::ConstraintViolation("budget".into()));
    assert_eq!(snapshot(&order), before);
    assert_eq!(order.dirty_fields(), &dirty_before);
}

#[test]
fn test_division_by_zero_keeps_prior_value() {
    let registry = registry(DIVISION);
    let mut ratio = registry.new_worksheet("ratio").unwrap();
    ratio.set("a", 10).unwrap();
    ratio.set("b", 4).unwrap();
    assert_eq!(ratio.get("c").unwrap().to_string(), "2.50");

    let err = ratio.set("b", 0).unwrap_err();

    assert_eq!(err, MutationError::Evaluation(EvaluationError::DivisionByZero));
    assert_eq!(ratio.get("c").unwrap().to_string(), "2.50");
    assert_eq!(ratio.get("b").unwrap().to_string(), "4.00");
}

#[test]
fn test_rounding_keeps_declared_scale() {
    let registry = registry(DIVISION);
    let mut ratio = registry.new_worksheet("ratio").unwrap();
    ratio.set("a", 1).unwrap();
    ratio.set("b", 3).unwrap();
    assert_eq!(ratio.get("c").unwrap().to_string(), "0.33");

    ratio.set("a", 2).unwrap();
    assert_eq!(ratio.get("c").unwrap().to_string(), "0.67");
}

#[test]
fn test_selector_through_link() {
    let source = r#"
        worksheet person {
          1:age number(0)
        }
        worksheet policy {
          1:holder person
          2:holder_age number(0) computed_by { holder.age }
          3:adult bool computed_by { holder.age >= 18 }
        }
    "#;
    let registry = registry(source);
    let mut bob = registry.new_worksheet("person").unwrap();
    bob.set("age", 17).unwrap();

    let mut policy = registry.new_worksheet("policy").unwrap();
    policy.link("holder", &bob).unwrap();
    assert_eq!(policy.get("holder_age").unwrap(), &Value::from(17));
    assert_eq!(policy.get("adult").unwrap(), &Value::Bool(false));

    // The link is a snapshot: relinking picks up the change
    bob.set("age", 18).unwrap();
    assert_eq!(policy.get("adult").unwrap(), &Value::Bool(false));
    policy.link("holder", &bob).unwrap();
    assert_eq!(policy.get("adult").unwrap(), &Value::Bool(true));
}

#[test]
fn test_slice_mutations() {
    let registry = registry(ORDERS);
    let mut order = registry.new_worksheet("order").unwrap();

    order.append("tags", "rush").unwrap();
    order.append("tags", "gift").unwrap();
    order.del("tags", 0).unwrap();
    assert_eq!(order.get("tags").unwrap().to_string(), r#"["gift"]"#);

    assert!(matches!(
        order.del("tags", 1),
        Err(MutationError::Index { index: 1, len: 1, .. })
    ));
}
