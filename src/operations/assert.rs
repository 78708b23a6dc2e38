use async_trait::async_trait;
use serde_json::Value;

use super::internal::{apply_namespacer, poll, read, template_reference, traced};
use super::{Operation, OperationError, OperationResult, Services};
use crate::bindings::Bindings;
use crate::check::check;
use crate::client::Resource;
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Outputs;
use crate::report::ResourceError;

/// Waits until at least one resource matches the expected document.
///
/// A document without `apiVersion` and `kind` is not a resource reference;
/// it is checked against `null` so it can hold pure binding assertions.
#[derive(Debug, Clone)]
pub struct Assert {
    services: Services,
    expected: Resource,
}

impl Assert {
    pub fn new(services: Services, expected: Resource) -> Self {
        Self { services, expected }
    }

    async fn prepare(&self, bindings: &Bindings) -> Result<Resource, OperationError> {
        let mut obj = template_reference(&self.services, bindings, &self.expected)?;
        if !obj.kind().is_empty() {
            apply_namespacer(&self.services, &mut obj).await?;
        }
        Ok(obj)
    }

    async fn run(
        &self,
        ctx: &ExecutionContext,
        bindings: &Bindings,
        obj: &Resource,
    ) -> OperationResult {
        poll(ctx, self.services.poll_interval, || self.attempt(bindings, obj)).await?;
        Ok(Outputs::new())
    }

    async fn attempt(
        &self,
        bindings: &Bindings,
        obj: &Resource,
    ) -> Result<Vec<OperationError>, OperationError> {
        let compilers = &self.services.compilers;
        if !obj.is_reference() {
            let violations = check(&Value::Null, obj.as_value(), bindings, compilers)?;
            return Ok(violations.into_error().into_iter().map(Into::into).collect());
        }
        let candidates = match read(self.services.client.as_ref(), obj).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => return Ok(vec![OperationError::ActualNotFound]),
            Err(e) => return Err(e.into()),
        };
        if candidates.is_empty() {
            return Ok(vec![OperationError::NoActualResource]);
        }
        let mut errors = Vec::new();
        for candidate in candidates {
            let violations = check(candidate.as_value(), obj.as_value(), bindings, compilers)?;
            if violations.is_empty() {
                return Ok(Vec::new());
            }
            let mut error = ResourceError::new(obj.as_value().clone(), candidate, violations);
            if self.services.template {
                error = error.with_template(bindings.clone(), compilers.clone());
            }
            errors.push(error.into());
        }
        Ok(errors)
    }
}

#[async_trait]
impl Operation for Assert {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Assert,
            &self.expected,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}
