use serde_json::{Map, Value};

use super::{mutate, TemplateResult};
use crate::bindings::Bindings;
use crate::expression::Compilers;

/// Deep merge of `patch` into `base`. Maps merge key by key, anything else in
/// `patch` replaces the value in `base`.
pub fn merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

/// Evaluates each template against the current object and merges the result
/// back into it, in order.
pub fn template_and_merge(
    obj: Value,
    bindings: &Bindings,
    compilers: &Compilers,
    templates: &[Value],
) -> TemplateResult<Value> {
    let mut obj = obj;
    for template in templates {
        let patch = mutate(template, &obj, bindings, compilers)?;
        obj = merge(obj, patch);
    }
    Ok(obj)
}

/// Templates only the identifying fields of a resource reference
/// (`apiVersion`, `kind`, name, namespace and labels), leaving the rest of
/// the document untouched. Documents without `apiVersion` and `kind` are not
/// references and are returned as is.
pub fn template_resource_ref(
    obj: Value,
    bindings: &Bindings,
    compilers: &Compilers,
) -> TemplateResult<Value> {
    let has_ref = ["apiVersion", "kind"]
        .iter()
        .all(|key| obj.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()));
    if !has_ref {
        return Ok(obj);
    }

    let mut reference = Map::new();
    for key in ["apiVersion", "kind"] {
        if let Some(value) = obj.get(key) {
            reference.insert(key.to_string(), value.clone());
        }
    }
    let mut metadata = Map::new();
    for key in ["name", "namespace", "labels"] {
        if let Some(value) = obj.get("metadata").and_then(|m| m.get(key)) {
            metadata.insert(key.to_string(), value.clone());
        }
    }
    if !metadata.is_empty() {
        reference.insert("metadata".to_string(), Value::Object(metadata));
    }

    let reference = Value::Object(reference);
    let templated = mutate(&reference, &reference, bindings, compilers)?;
    let mut obj = obj;
    if let (Value::Object(target), Value::Object(templated)) = (&mut obj, templated) {
        for (key, value) in templated {
            if key == "metadata" {
                let meta = target
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let (Value::Object(meta), Value::Object(values)) = (meta, value) {
                    meta.extend(values);
                }
            } else {
                target.insert(key, value);
            }
        }
    }
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge() {
        let merged = merge(
            json!({"a": {"b": 1, "c": 2}, "d": [1, 2]}),
            json!({"a": {"c": 3}, "d": [3]}),
        );
        assert_eq!(merged, json!({"a": {"b": 1, "c": 3}, "d": [3]}));
    }

    #[test]
    fn test_template_and_merge_keeps_original_fields() {
        let bindings = Bindings::new().register("suffix", json!("x")).unwrap();
        let obj = json!({
            "kind": "ConfigMap",
            "metadata": {"name": "cm"},
            "data": {"key": "(concat('value-', $suffix))"}
        });
        let out = template_and_merge(obj.clone(), &bindings, &Compilers::new(), &[obj]).unwrap();
        assert_eq!(
            out,
            json!({
                "kind": "ConfigMap",
                "metadata": {"name": "cm"},
                "data": {"key": "value-x"}
            })
        );
    }

    #[test]
    fn test_template_resource_ref() {
        let bindings = Bindings::new().register("ns", json!("team-a")).unwrap();
        let obj = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "($ns)"},
            "spec": {"x": "(untouched)"}
        });
        let out = template_resource_ref(obj, &bindings, &Compilers::new()).unwrap();
        assert_eq!(out["metadata"]["namespace"], json!("team-a"));
        assert_eq!(out["spec"]["x"], json!("(untouched)"));

        let not_a_ref = json!({"foo": "($missing)"});
        assert_eq!(
            template_resource_ref(not_a_ref.clone(), &Bindings::new(), &Compilers::new()).unwrap(),
            not_a_ref
        );
    }
}
