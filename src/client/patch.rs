use serde_json::Value;

use super::Resource;

/// Body of a merge patch that turns `actual` into `desired`: the desired
/// document carrying the observed resource version.
pub fn merge_patch(actual: &Resource, desired: &Resource) -> Value {
    let mut patch = desired.clone();
    patch.set_resource_version(actual.resource_version());
    patch.into_value()
}

/// Applies a JSON merge patch (RFC 7386) to `target`.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.as_str()).or_insert(Value::Null), value);
            }
        }
    }
}
