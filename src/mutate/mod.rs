//! # Template Evaluation
//!
//! A template document is parsed once into a [`Node`] tree and can then be
//! evaluated any number of times against different inputs and bindings.
//! Evaluation walks the template and the input in lock-step: map keys
//! project the same key out of the input, slice indexes project the same
//! index. String scalars holding an embedded expression are replaced with the
//! expression's result, evaluated with the projected input as the current
//! node.

mod merge;

pub use merge::{merge, template_and_merge, template_resource_ref};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::bindings::Bindings;
use crate::expression::{parse_embedded, Compilers, Embedded, ExpressionError};
use crate::field::{FieldPath, Violation};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("{violation}")]
    Expression {
        violation: Violation,
        #[source]
        source: ExpressionError,
    },
    #[error("{0}")]
    TypeInvalid(Violation),
}

impl TemplateError {
    pub fn violation(&self) -> &Violation {
        match self {
            TemplateError::Expression { violation, .. } => violation,
            TemplateError::TypeInvalid(violation) => violation,
        }
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Map(IndexMap<String, Node>),
    Slice(Vec<Node>),
    Scalar(Value),
}

impl Node {
    pub fn parse(template: &Value) -> Node {
        match template {
            Value::Object(map) => Node::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Node::parse(value)))
                    .collect(),
            ),
            Value::Array(items) => Node::Slice(items.iter().map(Node::parse).collect()),
            scalar => Node::Scalar(scalar.clone()),
        }
    }

    pub fn mutate(
        &self,
        path: &FieldPath,
        input: &Value,
        bindings: &Bindings,
        compilers: &Compilers,
    ) -> TemplateResult<Value> {
        match self {
            Node::Map(children) => {
                let mut out = Map::new();
                for (key, child) in children {
                    let projection = input.get(key).unwrap_or(&Value::Null);
                    let value = child.mutate(&path.child(key), projection, bindings, compilers)?;
                    out.insert(key.clone(), value);
                }
                Ok(Value::Object(out))
            }
            Node::Slice(children) => {
                let items = match input {
                    Value::Null => None,
                    Value::Array(items) => Some(items),
                    other => {
                        return Err(TemplateError::TypeInvalid(Violation::type_invalid(
                            path,
                            other,
                            "expected a slice or array",
                        )))
                    }
                };
                let mut out = Vec::with_capacity(children.len());
                for (i, child) in children.iter().enumerate() {
                    let projection = items.and_then(|items| items.get(i)).unwrap_or(&Value::Null);
                    out.push(child.mutate(&path.index(i), projection, bindings, compilers)?);
                }
                Ok(Value::Array(out))
            }
            Node::Scalar(rhs) => {
                let Some(Embedded::Expression { dialect, statement }) =
                    rhs.as_str().and_then(parse_embedded)
                else {
                    return Ok(rhs.clone());
                };
                compilers
                    .execute(dialect, statement, input, bindings)
                    .map_err(|source| TemplateError::Expression {
                        violation: Violation::internal(path, source.to_string()),
                        source,
                    })
            }
        }
    }
}

/// Parses `template` and evaluates it against `input`.
pub fn mutate(
    template: &Value,
    input: &Value,
    bindings: &Bindings,
    compilers: &Compilers,
) -> TemplateResult<Value> {
    Node::parse(template).mutate(&FieldPath::root(), input, bindings, compilers)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn run(template: Value, input: Value) -> TemplateResult<Value> {
        mutate(&template, &input, &Bindings::new(), &Compilers::new())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(run(Value::Null, json!(42)).unwrap(), Value::Null);
        assert_eq!(run(json!(64), json!(42)).unwrap(), json!(64));
        assert_eq!(run(json!("('abc')"), json!("42")).unwrap(), json!("abc"));
        assert_eq!(run(json!("plain"), json!("42")).unwrap(), json!("plain"));
    }

    #[test]
    fn test_map_projection() {
        let out = run(json!({"c": "(a+b)"}), json!({"c": {"a": 12, "b": 24}})).unwrap();
        assert_eq!(out, json!({"c": 36}));
    }

    #[test]
    fn test_slice_projection() {
        let out = run(
            json!({"c": ["(a+b)", "x"]}),
            json!({"c": [{"a": 12, "b": 24}]}),
        )
        .unwrap();
        assert_eq!(out, json!({"c": [36, "x"]}));
    }

    #[test]
    fn test_slice_shape_mismatch() {
        let err = run(json!({"c": ["x"]}), json!({"c": {"a": 1}})).unwrap_err();
        assert!(matches!(err, TemplateError::TypeInvalid(_)));
        assert_eq!(err.violation().field, "c");
        assert_eq!(
            err.to_string(),
            "c: Invalid type: {\"a\":1}: expected a slice or array"
        );
    }

    #[test]
    fn test_escape_is_verbatim() {
        let bindings = Bindings::new().register("foo", json!("bar")).unwrap();
        let out = mutate(
            &json!(r"\(foo())\"),
            &json!({"foo": 1}),
            &bindings,
            &Compilers::new(),
        )
        .unwrap();
        assert_eq!(out, json!(r"\(foo())\"));
    }

    #[test]
    fn test_bindings_and_errors() {
        let bindings = Bindings::new().register("ns", json!("team-a")).unwrap();
        let out = mutate(
            &json!({"metadata": {"namespace": "($ns)"}}),
            &Value::Null,
            &bindings,
            &Compilers::new(),
        )
        .unwrap();
        assert_eq!(out, json!({"metadata": {"namespace": "team-a"}}));

        let err = run(json!({"spec": {"x": "($missing)"}}), Value::Null).unwrap_err();
        assert_eq!(err.violation().field, "spec.x");
        assert!(matches!(
            err,
            TemplateError::Expression {
                source: ExpressionError::UndefinedVariable(_),
                ..
            }
        ));

        let err = run(json!("(cel;true)"), Value::Null).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Expression {
                source: ExpressionError::UnknownDialect(_),
                ..
            }
        ));
    }
}
