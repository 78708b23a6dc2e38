mod common;

use chainsaw::check::{check, expect, Expectation};
use chainsaw::expression::Compilers;
use chainsaw::mutate::mutate;
use chainsaw::Bindings;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};

#[test]
fn test_projection_arithmetic() {
    let output = mutate(
        &json!({"c": "(a+b)"}),
        &json!({"c": {"a": 12, "b": 24}}),
        &Bindings::new(),
        &Compilers::default(),
    )
    .unwrap();
    assert_eq!(output, json!({"c": 36}));
}

#[test]
fn test_escape_is_never_evaluated() {
    let bindings = Bindings::new().register("foo", json!("bar")).unwrap();
    for input in [Value::Null, json!({"x": 1}), json!("(foo())")] {
        let output = mutate(
            &json!(r"\(foo())\"),
            &input,
            &bindings,
            &Compilers::default(),
        )
        .unwrap();
        assert_eq!(output, json!(r"\(foo())\"));
    }
}

#[test]
fn test_binding_isolation() {
    let parent = Bindings::new().register("a", json!(1)).unwrap();
    let child = parent.register("x", json!(2)).unwrap();
    assert_eq!(child.get("x"), Some(&json!(2)));
    assert_eq!(parent.get("x"), None);
    let sibling = parent.register("x", json!(3)).unwrap();
    assert_eq!(child.get("x"), Some(&json!(2)));
    assert_eq!(sibling.get("x"), Some(&json!(3)));
}

#[test]
fn test_expectation_short_circuit() {
    let compilers = Compilers::default();
    let obj = json!({"kind": "Pod"});
    let expectations = vec![Expectation::new(json!({"kind": "Service"}))
        .with_match(json!({"kind": "Deployment"}))];
    let (matched, result) = expect(&obj, &Bindings::new(), &compilers, &expectations);
    assert!(!matched);
    assert!(result.is_ok());
}

fn flat_document() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,8}", 1..8).prop_map(|m| {
        m.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_subset_always_matches(actual in flat_document(), keep in prop::collection::vec(any::<bool>(), 8)) {
        let expected: serde_json::Map<String, Value> = actual
            .iter()
            .zip(keep.iter().cycle())
            .filter(|(_, keep)| **keep)
            .map(|((k, v), _)| (k.clone(), v.clone()))
            .collect();
        let violations = check(
            &Value::Object(actual),
            &Value::Object(expected),
            &Bindings::new(),
            &Compilers::default(),
        )
        .unwrap();
        prop_assert!(violations.is_empty());
    }

    #[test]
    fn prop_changed_field_is_reported(actual in flat_document()) {
        let (key, value) = actual.iter().next().map(|(k, v)| (k.clone(), v.clone())).unwrap();
        let changed = format!("{}-changed", value.as_str().unwrap());
        let mut expected = actual.clone();
        expected.insert(key.clone(), Value::String(changed));
        let violations = check(
            &Value::Object(actual),
            &Value::Object(expected),
            &Bindings::new(),
            &Compilers::default(),
        )
        .unwrap();
        prop_assert_eq!(violations.len(), 1);
        let prefix = format!("{}:", key);
        prop_assert!(violations.sorted_lines()[0].starts_with(&prefix));
    }
}
