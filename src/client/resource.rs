use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coordinates of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    /// Empty for cluster-scoped resources
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.into(),
        }
    }

    /// `ns/name`, `name`, with `*` standing in for a missing name.
    pub fn name_ref(&self) -> String {
        let name = if self.name.is_empty() { "*" } else { &self.name };
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.namespace, name)
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.api_version, self.kind, self.name_ref())
    }
}

/// Untyped cluster resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Value);

impl Resource {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    fn str_field(&self, field: &str) -> &str {
        self.0.get(field).and_then(Value::as_str).unwrap_or_default()
    }

    fn metadata_field(&self, field: &str) -> Option<&Value> {
        self.0.get("metadata").and_then(|m| m.get(field))
    }

    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    pub fn name(&self) -> &str {
        self.metadata_field("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata_field("namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_field("resourceVersion").and_then(Value::as_str)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata_field("labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Has the `apiVersion` and `kind` needed to address the cluster.
    pub fn is_reference(&self) -> bool {
        !self.api_version().is_empty() && !self.kind().is_empty()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            api_version: self.api_version().to_string(),
            kind: self.kind().to_string(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let obj = self.0.as_object_mut()?;
        let metadata = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        metadata.as_object_mut()
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
    }

    pub fn set_resource_version(&mut self, version: Option<&str>) {
        if let Some(metadata) = self.metadata_mut() {
            match version {
                Some(version) => {
                    metadata.insert(
                        "resourceVersion".to_string(),
                        Value::String(version.to_string()),
                    );
                }
                None => {
                    metadata.remove("resourceVersion");
                }
            }
        }
    }
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.0
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
