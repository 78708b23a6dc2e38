//! Named outputs extracted from the outcome of an operation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::bindings::{resolve_binding, Binding, BindingError, Bindings};
use crate::check::{check, CheckError};
use crate::expression::Compilers;

/// Ordered set of values an operation hands back to the step driver.
pub type Outputs = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_: Option<Value>,
    #[serde(flatten)]
    pub binding: Binding,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            match_: None,
            binding: Binding::new(name, value),
        }
    }

    pub fn with_match(mut self, filter: Value) -> Self {
        self.match_ = Some(filter);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Check(#[from] CheckError),
}

/// Resolves each declared output against `input`. Outputs whose match does
/// not hold are skipped. Each resolved output is visible to the ones after
/// it.
pub fn process(
    bindings: &Bindings,
    compilers: &Compilers,
    input: &Value,
    outputs: &[Output],
) -> Result<Outputs, OutputError> {
    let mut bindings = bindings.clone();
    let mut results = Outputs::new();
    for output in outputs {
        if let Some(filter) = output.match_.as_ref().filter(|m| !m.is_null()) {
            if !check(input, filter, &bindings, compilers)?.is_empty() {
                continue;
            }
        }
        let (name, value) = resolve_binding(&bindings, compilers, input, &output.binding)?;
        bindings = bindings.register(&name, value.clone())?;
        results.insert(name, value);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_process_outputs() {
        let input = json!({"metadata": {"name": "web", "uid": "123"}});
        let outputs = vec![
            Output::new("name", json!("(metadata.name)")),
            Output::new("greeting", json!("(concat('hello ', $name))")),
            Output::new("skipped", json!(true)).with_match(json!({"kind": "Secret"})),
        ];
        let results = process(&Bindings::new(), &Compilers::new(), &input, &outputs).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["name"], json!("web"));
        assert_eq!(results["greeting"], json!("hello web"));
    }

    #[test]
    fn test_empty_outputs() {
        let results = process(&Bindings::new(), &Compilers::new(), &Value::Null, &[]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_deserialize_flattened() {
        let output: Output = serde_json::from_value(json!({
            "name": "x",
            "value": "($stdout)",
            "match": {"($error)": null}
        }))
        .unwrap();
        assert_eq!(output.binding.name, "x");
        assert!(output.match_.is_some());
    }
}
