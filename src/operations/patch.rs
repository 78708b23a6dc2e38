use async_trait::async_trait;

use super::internal::{apply_namespacer, handle_check, retry, template_document, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::Expectation;
use crate::client::{merge_patch, Resource};
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Output;

/// Merges the declared fields into a resource that must already exist.
#[derive(Debug, Clone)]
pub struct Patch {
    services: Services,
    resource: Resource,
    expect: Vec<Expectation>,
    outputs: Vec<Output>,
}

impl Patch {
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
        retry(ctx, self.services.poll_interval, || self.try_patch(bindings, obj)).await
    }

    async fn try_patch(&self, bindings: &Bindings, obj: &Resource) -> OperationResult {
        let client = &self.services.client;
        let actual = client.get(&obj.key()).await?;
        let patch = merge_patch(&actual, obj);
        let (obj, result) = match client.patch(&obj.key(), &patch).await {
            Ok(patched) => (patched, Ok(())),
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
impl Operation for Patch {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Patch,
            &self.resource,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}
