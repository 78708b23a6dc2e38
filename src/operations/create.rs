use async_trait::async_trait;

use super::internal::{apply_namespacer, handle_check, retry, template_document, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::Expectation;
use crate::client::Resource;
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Output;

/// Creates a resource that must not exist yet.
#[derive(Debug, Clone)]
pub struct Create {
    services: Services,
    resource: Resource,
    expect: Vec<Expectation>,
    outputs: Vec<Output>,
}

impl Create {
    pub fn new(services: Services, resource: Resource) -> Self {
        Self {
            services,
            resource,
            expect: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_expect(mut self, expect: Vec<Expectation>) -> Self {
        self.expect = expect;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    async fn prepare(&self, bindings: &Bindings) -> Result<Resource, OperationError> {
        let mut obj = template_document(&self.services, bindings, &self.resource)?;
        apply_namespacer(&self.services, &mut obj).await?;
        Ok(obj)
    }

    async fn run(
        &self,
        ctx: &ExecutionContext,
        bindings: &Bindings,
        obj: &Resource,
    ) -> OperationResult {
        retry(ctx, self.services.poll_interval, || {
            self.try_create(bindings, obj)
        })
        .await
    }

    async fn try_create(&self, bindings: &Bindings, obj: &Resource) -> OperationResult {
        match self.services.client.get(&obj.key()).await {
            Ok(_) => Err(OperationError::AlreadyExists),
            Err(e) if e.is_not_found() => self.create(bindings, obj).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, bindings: &Bindings, obj: &Resource) -> OperationResult {
        let (obj, result) = match self.services.client.create(obj).await {
            Ok(created) => {
                if let Some(cleaner) = &self.services.cleaner {
                    cleaner
                        .add(self.services.client.clone(), created.clone())
                        .await;
                }
                (created, Ok(()))
            }
            Err(e) => (obj.clone(), Err(e.into())),
        };
        handle_check(
            &self.services.compilers,
            bindings,
            obj.as_value(),
            result,
            &self.expect,
            &self.outputs,
        )
    }
}

#[async_trait]
impl Operation for Create {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Create,
            &self.resource,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::cleanup::Cleaner;
    use crate::client::memory::{MemoryClient, Verb};
    use crate::client::{Client, ClientError, PropagationPolicy, StatusReason};
    use crate::namespacer::Namespacer;

    fn pod() -> Resource {
        Resource::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "test-pod"},
            "spec": {"containers": [{"name": "c", "image": "nginx"}]}
        }))
    }

    fn services(client: Arc<MemoryClient>) -> Services {
        Services::new(client)
            .with_namespacer(Namespacer::new("chainsaw"))
            .with_poll_interval(Duration::from_millis(5))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new().with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_events_name_templated_resource() {
        let events = crate::logging::capture::Events::default();
        let _guard = events.install();
        let client = Arc::new(MemoryClient::new());
        let bindings = Bindings::new().register("suffix", json!("x")).unwrap();
        let op = Create::new(
            services(client),
            Resource::new(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "(concat('cm-', $suffix))"}
            })),
        );
        op.exec(&ctx(), &bindings).await.unwrap();
        let records: Vec<_> = events
            .records()
            .into_iter()
            .filter(|r| r.operation == "CREATE")
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, "RUN");
        assert_eq!(records[1].status, "DONE");
        assert!(records.iter().all(|r| r.resource == "v1/ConfigMap/chainsaw/cm-x"));
    }

    #[tokio::test]
    async fn test_create() {
        let client = Arc::new(MemoryClient::new());
        let cleaner = Cleaner::new(Duration::from_secs(5), None, PropagationPolicy::Background);
        let op = Create::new(services(client.clone()).with_cleaner(cleaner.clone()), pod())
            .with_outputs(vec![Output::new("uid", json!("(metadata.resourceVersion)"))]);
        let outputs = op.exec(&ctx(), &Bindings::new()).await.unwrap();
        assert_eq!(outputs["uid"], json!("1"));
        let created = client
            .get(&crate::client::ObjectKey::new("v1", "Pod", Some("chainsaw"), "test-pod"))
            .await
            .unwrap();
        assert_eq!(created.namespace(), "chainsaw");
        assert_eq!(cleaner.len().await, 1);
    }

    #[tokio::test]
    async fn test_already_exists() {
        let client = Arc::new(MemoryClient::new());
        let mut existing = pod();
        existing.set_namespace("chainsaw");
        client.insert(existing.into_value()).await;
        let err = Create::new(services(client.clone()), pod())
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "the resource already exists in the cluster");
        assert_eq!(client.calls(Verb::Get).await, 1);
        assert_eq!(client.calls(Verb::Create).await, 0);
    }

    #[tokio::test]
    async fn test_lost_race_is_not_retried() {
        let client = Arc::new(MemoryClient::new());
        let mut existing = pod();
        existing.set_namespace("chainsaw");
        let key = existing.key();
        client
            .fail(Verb::Get, ClientError::not_found(&key), 1)
            .await;
        client.insert(existing.into_value()).await;
        let err = Create::new(services(client.clone()), pod())
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Client(ref e) if e.is_already_exists()));
        assert_eq!(client.calls(Verb::Get).await, 1);
        assert_eq!(client.calls(Verb::Create).await, 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = Arc::new(MemoryClient::new());
        client
            .fail(
                Verb::Create,
                ClientError::new(StatusReason::TooManyRequests, "slow down"),
                3,
            )
            .await;
        Create::new(services(client.clone()), pod())
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap();
        assert_eq!(client.calls(Verb::Create).await, 4);
    }

    #[tokio::test]
    async fn test_deadline_reports_last_transient_error() {
        let client = Arc::new(MemoryClient::new());
        client
            .fail(
                Verb::Create,
                ClientError::new(StatusReason::ServiceUnavailable, "unavailable"),
                1_000,
            )
            .await;
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(50));
        let err = Create::new(services(client), pod())
            .exec(&ctx, &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unavailable");
    }

    #[tokio::test]
    async fn test_permanent_error() {
        let client = Arc::new(MemoryClient::new());
        client
            .fail(Verb::Create, ClientError::new(StatusReason::BadRequest, "bad"), 1)
            .await;
        let err = Create::new(services(client.clone()), pod())
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad");
        assert_eq!(client.calls(Verb::Create).await, 1);
    }

    #[tokio::test]
    async fn test_expected_failure() {
        let client = Arc::new(MemoryClient::new());
        client
            .fail(Verb::Create, ClientError::new(StatusReason::Forbidden, "denied by policy"), 1)
            .await;
        let op = Create::new(services(client), pod()).with_expect(vec![Expectation::new(
            json!({"($error)": "denied by policy"}),
        )]);
        op.exec(&ctx(), &Bindings::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_expected_failure_that_succeeds() {
        let client = Arc::new(MemoryClient::new());
        let op = Create::new(services(client), pod()).with_expect(vec![Expectation::new(
            json!({"($error != `null`)": true}),
        )]);
        let err = op.exec(&ctx(), &Bindings::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "($error != `null`): Invalid value: false: Expected value: true"
        );
    }

    #[tokio::test]
    async fn test_templated_document() {
        let client = Arc::new(MemoryClient::new());
        let bindings = Bindings::new().register("suffix", json!("x")).unwrap();
        let resource = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "(concat('cm-', $suffix))"},
            "data": {"suffix": "($suffix)"}
        }));
        Create::new(services(client.clone()), resource)
            .exec(&ctx(), &bindings)
            .await
            .unwrap();
        let created = client
            .get(&crate::client::ObjectKey::new("v1", "ConfigMap", Some("chainsaw"), "cm-x"))
            .await
            .unwrap();
        assert_eq!(created.as_value()["data"]["suffix"], json!("x"));
    }
}
