use serde_json::{Map, Value};
use similar::TextDiff;

/// Drops keys from `actual` that `expected` does not mention, so the diff
/// only shows what the expectation talks about.
fn prune(expected: &Map<String, Value>, actual: &mut Map<String, Value>, keep: &[&str]) {
    actual.retain(|key, _| keep.contains(&key.as_str()) || expected.contains_key(key));
    for (key, value) in actual.iter_mut() {
        if let (Some(Value::Object(expected)), Value::Object(actual)) = (expected.get(key), value) {
            prune(expected, actual, &[]);
        }
    }
}

fn prune_root(expected: &Map<String, Value>, actual: &mut Map<String, Value>) {
    actual.retain(|key, _| expected.contains_key(key));
    for (key, value) in actual.iter_mut() {
        if let (Some(Value::Object(expected)), Value::Object(actual)) = (expected.get(key), value) {
            let keep: &[&str] = if key == "metadata" {
                &["name", "ownerReferences"]
            } else {
                &[]
            };
            prune(expected, actual, keep);
        }
    }
}

/// Unified diff, in YAML, between an expected and an actual document.
pub fn pretty_diff(expected: &Value, actual: &Value) -> Result<String, serde_yaml::Error> {
    let mut actual = actual.clone();
    if let (Value::Object(expected), Value::Object(actual)) = (expected, &mut actual) {
        prune_root(expected, actual);
    }
    let expected = serde_yaml::to_string(expected)?;
    let actual = serde_yaml::to_string(&actual)?;
    if expected == actual {
        return Ok(String::new());
    }
    let diff = TextDiff::from_lines(&expected, &actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "actual")
        .to_string();
    Ok(diff)
}
