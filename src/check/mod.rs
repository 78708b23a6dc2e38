//! # Structural Checks
//!
//! An assertion tree is a partial document: every key path it names must be
//! present in the actual document with an equal value, anything it does not
//! name is ignored. On top of plain values the tree understands:
//!
//! * expression scalars, `(stmt)`, compared by their result
//! * expression keys, `{"(length(items))": 3}`, which project a value out of
//!   the actual node instead of looking up a field
//! * escaped scalars and keys, `\(x)\`, matched literally as `(x)`
//!
//! Mismatches are reported as [`Violations`]; a failing expression aborts the
//! check with a [`CheckError`].

mod expect;

pub use expect::{expect, ExpectError, Expectation};

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::bindings::Bindings;
use crate::expression::{parse_embedded, values_equal, Compilers, Embedded, ExpressionError};
use crate::field::{FieldPath, Violation, Violations};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{violation}")]
pub struct CheckError {
    pub violation: Violation,
    #[source]
    pub source: ExpressionError,
}

pub type CheckResult = Result<Violations, CheckError>;

#[derive(Debug, Clone, PartialEq)]
enum Key {
    Field(String),
    Expression {
        dialect: Option<String>,
        statement: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Assertion {
    /// Raw key kept for paths
    Map(IndexMap<String, (Key, Assertion)>),
    Slice(Vec<Assertion>),
    Scalar(Value),
}

impl Assertion {
    fn parse(expected: &Value) -> Assertion {
        match expected {
            Value::Object(map) => Assertion::Map(
                map.iter()
                    .map(|(raw, value)| (raw.clone(), (parse_key(raw), Assertion::parse(value))))
                    .collect(),
            ),
            Value::Array(items) => Assertion::Slice(items.iter().map(Assertion::parse).collect()),
            scalar => Assertion::Scalar(scalar.clone()),
        }
    }
}

fn parse_key(raw: &str) -> Key {
    match parse_embedded(raw) {
        Some(Embedded::Expression { dialect, statement }) => Key::Expression {
            dialect: dialect.map(str::to_string),
            statement: statement.to_string(),
        },
        Some(Embedded::Escaped(body)) => Key::Field(body.to_string()),
        None => Key::Field(raw.to_string()),
    }
}

struct Checker<'a> {
    bindings: &'a Bindings,
    compilers: &'a Compilers,
}

impl Checker<'_> {
    fn evaluate(
        &self,
        path: &FieldPath,
        dialect: Option<&str>,
        statement: &str,
        input: &Value,
    ) -> Result<Value, CheckError> {
        self.compilers
            .execute(dialect, statement, input, self.bindings)
            .map_err(|source| CheckError {
                violation: Violation::internal(path, source.to_string()),
                source,
            })
    }

    /// `actual` is `None` when the field does not exist in the input.
    fn check(
        &self,
        path: &FieldPath,
        node: &Assertion,
        actual: Option<&Value>,
        violations: &mut Violations,
    ) -> Result<(), CheckError> {
        match node {
            Assertion::Map(children) => {
                if children.is_empty() {
                    if actual.map_or(true, Value::is_null) {
                        violations.push(Violation::required(path, "field not found in the input object"));
                    }
                    return Ok(());
                }
                let object = match actual {
                    None | Some(Value::Null) => None,
                    Some(Value::Object(map)) => Some(map),
                    Some(other) => {
                        violations.push(Violation::type_invalid(path, other, "expected a map"));
                        return Ok(());
                    }
                };
                for (raw, (key, child)) in children {
                    let child_path = path.child(raw.as_str());
                    match key {
                        Key::Field(name) => {
                            let projected = object.and_then(|map| map.get(name));
                            self.check(&child_path, child, projected, violations)?;
                        }
                        Key::Expression { dialect, statement } => {
                            let input = actual.unwrap_or(&Value::Null);
                            let projected =
                                self.evaluate(&child_path, dialect.as_deref(), statement, input)?;
                            self.check(&child_path, child, Some(&projected), violations)?;
                        }
                    }
                }
                Ok(())
            }
            Assertion::Slice(children) => {
                let items = match actual {
                    None => {
                        violations.push(Violation::required(path, "field not found in the input object"));
                        return Ok(());
                    }
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        violations.push(Violation::type_invalid(
                            path,
                            other,
                            "expected a slice or array",
                        ));
                        return Ok(());
                    }
                };
                if items.len() != children.len() {
                    violations.push(Violation::invalid(
                        path,
                        &Value::Array(items.clone()),
                        "lengths of slices don't match",
                    ));
                    return Ok(());
                }
                for (i, (child, item)) in children.iter().zip(items).enumerate() {
                    self.check(&path.index(i), child, Some(item), violations)?;
                }
                Ok(())
            }
            Assertion::Scalar(rhs) => {
                let input = actual.unwrap_or(&Value::Null);
                let (expected, statement) = match rhs.as_str().and_then(parse_embedded) {
                    Some(Embedded::Expression { dialect, statement }) => {
                        (self.evaluate(path, dialect, statement, input)?, Some(statement))
                    }
                    Some(Embedded::Escaped(body)) => (Value::String(body.to_string()), None),
                    None => (rhs.clone(), None),
                };
                let Some(actual) = actual else {
                    if !expected.is_null() {
                        violations.push(Violation::required(path, "field not found in the input object"));
                    }
                    return Ok(());
                };
                if !values_equal(&expected, actual) {
                    let detail = match statement {
                        Some(statement) => format!("Expected value: {} ({})", expected, statement),
                        None => format!("Expected value: {}", expected),
                    };
                    violations.push(Violation::invalid(path, actual, detail));
                }
                Ok(())
            }
        }
    }
}

/// Checks `actual` against the assertion tree `expected`.
pub fn check(
    actual: &Value,
    expected: &Value,
    bindings: &Bindings,
    compilers: &Compilers,
) -> CheckResult {
    let checker = Checker { bindings, compilers };
    let mut violations = Violations::new();
    checker.check(
        &FieldPath::root(),
        &Assertion::parse(expected),
        Some(actual),
        &mut violations,
    )?;
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn run(actual: Value, expected: Value) -> Violations {
        check(&actual, &expected, &Bindings::new(), &Compilers::new()).unwrap()
    }

    #[test]
    fn test_subset_passes() {
        let actual = json!({"data": {"foo": "bar", "other": 1}, "kind": "ConfigMap"});
        assert!(run(actual, json!({"data": {"foo": "bar"}})).is_empty());
    }

    #[test]
    fn test_missing_nested_field() {
        let violations = run(json!({"kind": "ConfigMap"}), json!({"data": {"foo": "bar"}}));
        assert_eq!(
            violations.sorted_lines(),
            vec!["data.foo: Required value: field not found in the input object"]
        );
    }

    #[test]
    fn test_value_mismatch() {
        let violations = run(json!({"foo": "bar"}), json!({"foo": "baz"}));
        assert_eq!(
            violations.sorted_lines(),
            vec!["foo: Invalid value: \"bar\": Expected value: \"baz\""]
        );
    }

    #[test]
    fn test_slices() {
        assert!(run(json!({"a": [1, 2]}), json!({"a": [1, 2]})).is_empty());
        let violations = run(json!({"a": [1]}), json!({"a": [1, 2]}));
        assert_eq!(
            violations.sorted_lines(),
            vec!["a: Invalid value: [1]: lengths of slices don't match"]
        );
        let violations = run(json!({"a": {"b": 1}}), json!({"a": [1]}));
        assert_eq!(violations.iter().next().unwrap().detail, "expected a slice or array");
    }

    #[test]
    fn test_expression_scalar_and_key() {
        let actual = json!({"items": [1, 2, 3], "replicas": 3});
        assert!(run(actual.clone(), json!({"(length(items))": 3})).is_empty());
        assert!(run(actual.clone(), json!({"replicas": "(`1` + `2`)"})).is_empty());
        let violations = run(actual, json!({"(length(items))": 4}));
        assert_eq!(
            violations.sorted_lines(),
            vec!["(length(items)): Invalid value: 3: Expected value: 4"]
        );
    }

    #[test]
    fn test_escaped_scalar_matches_literal() {
        assert!(run(json!({"a": "(x)"}), json!({"a": r"\(x)\"})).is_empty());
    }

    #[test]
    fn test_bindings_in_check() {
        let bindings = Bindings::new().register("error", Value::Null).unwrap();
        let violations = check(
            &Value::Null,
            &json!({"($error == null)": true}),
            &bindings,
            &Compilers::new(),
        )
        .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_expression_error_aborts() {
        let err = check(
            &json!({}),
            &json!({"a": "(nope())"}),
            &Bindings::new(),
            &Compilers::new(),
        )
        .unwrap_err();
        assert_eq!(err.violation.field, "a");
        assert!(matches!(err.source, ExpressionError::UnknownFunction(_)));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    }

    fn document() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map("[a-z]{1,4}", inner, 1..4)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        })
    }

    /// Keeps a random subset of the keys of every map.
    fn subset_of(value: &Value, mask: &mut impl Iterator<Item = bool>) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter_map(|(k, v)| {
                        if mask.next().unwrap_or(true) {
                            Some((k.clone(), subset_of(v, mask)))
                        } else {
                            None
                        }
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn prop_subset_always_matches(
            actual in document(),
            mask in prop::collection::vec(any::<bool>(), 0..32),
        ) {
            let expected = subset_of(&actual, &mut mask.into_iter());
            if expected.as_object().map_or(true, |m| !m.is_empty()) {
                let violations = run(actual, expected);
                prop_assert!(violations.is_empty(), "{:?}", violations);
            }
        }

        #[test]
        fn prop_changed_leaf_is_reported(
            key in "[a-z]{1,4}",
            actual_value in any::<i64>(),
            delta in 1i64..1000,
        ) {
            let actual = json!({"spec": {key.clone(): actual_value}});
            let expected = json!({"spec": {key.clone(): actual_value.wrapping_add(delta)}});
            let violations = run(actual, expected);
            prop_assert_eq!(violations.len(), 1);
            let path = format!("spec.{}", key);
            prop_assert_eq!(&violations.iter().next().unwrap().field, &path);
        }
    }
}
