use thiserror::Error;

use crate::client::{Client, ClientError, Resource};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NamespacerError {
    #[error("cannot set namespace on a non object resource")]
    InvalidResource,
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Injects a default namespace into namespace-scoped resources that do not
/// declare one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespacer {
    namespace: String,
}

impl Namespacer {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn apply(
        &self,
        client: &dyn Client,
        resource: &mut Resource,
    ) -> Result<(), NamespacerError> {
        if !resource.is_object() {
            return Err(NamespacerError::InvalidResource);
        }
        if !resource.namespace().is_empty() {
            return Ok(());
        }
        if client
            .is_namespaced(resource.api_version(), resource.kind())
            .await?
        {
            resource.set_namespace(&self.namespace);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::client::{MockClient, StatusReason};

    fn resource(namespace: Option<&str>) -> Resource {
        let mut value = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}});
        if let Some(namespace) = namespace {
            value["metadata"]["namespace"] = json!(namespace);
        }
        Resource::new(value)
    }

    #[tokio::test]
    async fn test_non_object_resource() {
        let client = MockClient::new();
        let mut obj = Resource::new(Value::Null);
        assert_eq!(
            Namespacer::new("test").apply(&client, &mut obj).await,
            Err(NamespacerError::InvalidResource)
        );
    }

    #[tokio::test]
    async fn test_injects_for_namespaced_kinds() {
        let mut client = MockClient::new();
        client
            .expect_is_namespaced()
            .with(eq("v1"), eq("ConfigMap"))
            .times(1)
            .returning(|_, _| Ok(true));
        let mut obj = resource(None);
        Namespacer::new("test-namespace")
            .apply(&client, &mut obj)
            .await
            .unwrap();
        assert_eq!(obj.namespace(), "test-namespace");
    }

    #[tokio::test]
    async fn test_cluster_scoped_stays_bare() {
        let mut client = MockClient::new();
        client
            .expect_is_namespaced()
            .times(1)
            .returning(|_, _| Ok(false));
        let mut obj = resource(None);
        Namespacer::new("test").apply(&client, &mut obj).await.unwrap();
        assert_eq!(obj.namespace(), "");
    }

    #[tokio::test]
    async fn test_existing_namespace_is_kept() {
        let mut client = MockClient::new();
        client.expect_is_namespaced().times(0);
        let mut obj = resource(Some("already-set"));
        Namespacer::new("test").apply(&client, &mut obj).await.unwrap();
        assert_eq!(obj.namespace(), "already-set");
    }

    #[tokio::test]
    async fn test_introspection_error() {
        let mut client = MockClient::new();
        client
            .expect_is_namespaced()
            .times(1)
            .returning(|_, _| Err(ClientError::new(StatusReason::NotFound, "no matches")));
        let mut obj = resource(None);
        assert!(matches!(
            Namespacer::new("test").apply(&client, &mut obj).await,
            Err(NamespacerError::Client(_))
        ));
    }
}
