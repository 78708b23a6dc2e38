use async_trait::async_trait;

use super::internal::{apply_namespacer, handle_check, read, template_document, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::Expectation;
use crate::client::{wait_for_deletion, Resource};
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Outputs;

/// Deletes every resource the declared document resolves to and waits
/// until they are gone.
#[derive(Debug, Clone)]
pub struct Delete {
    services: Services,
    resource: Resource,
    expect: Vec<Expectation>,
}

impl Delete {
    pub fn new(services: Services, resource: Resource) -> Self {
        Self {
            services,
            resource,
            expect: Vec::new(),
        }
    }

    pub fn with_expect(mut self, expect: Vec<Expectation>) -> Self {
        self.expect = expect;
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
        let candidates = match read(self.services.client.as_ref(), obj).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut errors = Vec::new();
        let mut deleted = Vec::new();
        for candidate in candidates {
            let result = match self
                .services
                .client
                .delete(&candidate, self.services.propagation)
                .await
            {
                Err(e) if !e.is_not_found() => Err(OperationError::from(e)),
                _ => {
                    deleted.push(candidate.key());
                    Ok(())
                }
            };
            if let Err(e) = handle_check(
                &self.services.compilers,
                bindings,
                candidate.as_value(),
                result,
                &self.expect,
                &[],
            ) {
                errors.push(e);
            }
        }
        for key in deleted {
            if let Err(e) = wait_for_deletion(
                ctx,
                self.services.client.as_ref(),
                &key,
                self.services.poll_interval,
            )
            .await
            {
                errors.push(e.into());
            }
        }
        match OperationError::combine(errors) {
            Some(e) => Err(e),
            None => Ok(Outputs::new()),
        }
    }
}

#[async_trait]
impl Operation for Delete {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Delete,
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
    use crate::client::memory::{MemoryClient, Verb};
    use crate::client::{Client, ClientError, StatusReason};
    use crate::context::ContextError;

    fn pod(name: &str, app: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "ns", "labels": {"app": app}}
        })
    }

    fn services(client: Arc<MemoryClient>) -> Services {
        Services::new(client).with_poll_interval(Duration::from_millis(5))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new().with_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_delete_waits_for_absence() {
        let client = Arc::new(MemoryClient::new());
        client.insert(pod("a", "web")).await;
        client.set_deletion_delay(3).await;
        let obj = Resource::new(pod("a", "web"));
        Delete::new(services(client.clone()), obj.clone())
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap();
        assert!(client.get(&obj.key()).await.unwrap_err().is_not_found());
        // one read to resolve, then reads until the lingering object expires
        assert_eq!(client.calls(Verb::Get).await, 1 + 4 + 1);
    }

    #[tokio::test]
    async fn test_delete_by_selector() {
        let client = Arc::new(MemoryClient::new());
        client.insert(pod("a", "web")).await;
        client.insert(pod("b", "web")).await;
        client.insert(pod("c", "db")).await;
        let selector = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"namespace": "ns", "labels": {"app": "web"}}
        }));
        Delete::new(services(client.clone()), selector)
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap();
        assert_eq!(client.len().await, 1);
        assert_eq!(client.calls(Verb::Delete).await, 2);
    }

    #[tokio::test]
    async fn test_nothing_to_delete() {
        let client = Arc::new(MemoryClient::new());
        Delete::new(services(client.clone()), Resource::new(pod("a", "web")))
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap();
        assert_eq!(client.calls(Verb::Delete).await, 0);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let client = Arc::new(MemoryClient::new());
        client.insert(pod("a", "web")).await;
        client
            .fail(Verb::Delete, ClientError::new(StatusReason::Forbidden, "forbidden"), 1)
            .await;
        let err = Delete::new(services(client.clone()), Resource::new(pod("a", "web")))
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "forbidden");
        assert_eq!(client.len().await, 1);
    }

    #[tokio::test]
    async fn test_expected_failure() {
        let client = Arc::new(MemoryClient::new());
        client.insert(pod("a", "web")).await;
        client
            .fail(Verb::Delete, ClientError::new(StatusReason::Forbidden, "forbidden"), 1)
            .await;
        Delete::new(services(client), Resource::new(pod("a", "web")))
            .with_expect(vec![Expectation::new(json!({"($error)": "forbidden"}))])
            .exec(&ctx(), &Bindings::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let client = Arc::new(MemoryClient::new());
        client.insert(pod("a", "web")).await;
        client.set_deletion_delay(1_000).await;
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(40));
        let err = Delete::new(services(client), Resource::new(pod("a", "web")))
            .exec(&ctx, &Bindings::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Context(ContextError::DeadlineExceeded)
        ));
    }
}
