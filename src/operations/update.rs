use async_trait::async_trait;

use super::internal::{apply_namespacer, handle_check, retry, template_document, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::Expectation;
use crate::client::Resource;
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Output;

/// Replaces an existing resource with the declared document.
#[derive(Debug, Clone)]
pub struct Update {
    services: Services,
    resource: Resource,
    expect: Vec<Expectation>,
    outputs: Vec<Output>,
}

impl Update {
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
        retry(ctx, self.services.poll_interval, || self.try_update(bindings, obj)).await
    }

    async fn try_update(&self, bindings: &Bindings, obj: &Resource) -> OperationResult {
        let client = &self.services.client;
        let actual = client.get(&obj.key()).await?;
        let mut desired = obj.clone();
        desired.set_resource_version(actual.resource_version());
        let (obj, result) = match client.update(&desired).await {
            Ok(updated) => (updated, Ok(())),
            Err(e) => (desired, Err(e.into())),
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
impl Operation for Update {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Update,
            &self.resource,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}
