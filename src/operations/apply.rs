use async_trait::async_trait;

use super::internal::{apply_namespacer, handle_check, retry, template_document, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::Expectation;
use crate::client::{merge_patch, Resource};
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Output;

/// Creates the resource, or merges the declared fields into the existing
/// one.
#[derive(Debug, Clone)]
pub struct Apply {
    services: Services,
    resource: Resource,
    expect: Vec<Expectation>,
    outputs: Vec<Output>,
}

impl Apply {
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
        retry(ctx, self.services.poll_interval, || self.try_apply(bindings, obj)).await
    }

    async fn try_apply(&self, bindings: &Bindings, obj: &Resource) -> OperationResult {
        let client = &self.services.client;
        let (obj, result) = match client.get(&obj.key()).await {
            Ok(actual) => {
                let patch = merge_patch(&actual, obj);
                match client.patch(&obj.key(), &patch).await {
                    Ok(patched) => (patched, Ok(())),
                    Err(e) => (obj.clone(), Err(e.into())),
                }
            }
            Err(e) if e.is_not_found() => match client.create(obj).await {
                Ok(created) => {
                    if let Some(cleaner) = &self.services.cleaner {
                        cleaner.add(client.clone(), created.clone()).await;
                    }
                    (created, Ok(()))
                }
                Err(e) => (obj.clone(), Err(OperationError::from(e))),
            },
            Err(e) => return Err(e.into()),
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
impl Operation for Apply {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Apply,
            &self.resource,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}
