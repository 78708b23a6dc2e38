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

/// Waits until no resource matches the given document. This is the `error`
/// verb of a test step.
#[derive(Debug, Clone)]
pub struct Refute {
    services: Services,
    expected: Resource,
}

impl Refute {
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
            return Ok(if violations.is_empty() {
                vec![OperationError::ExpectationMatched]
            } else {
                Vec::new()
            });
        }
        let candidates = match read(self.services.client.as_ref(), obj).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut errors = Vec::new();
        for candidate in candidates {
            if check(candidate.as_value(), obj.as_value(), bindings, compilers)?.is_empty() {
                errors.push(OperationError::ResourceMatches(candidate.key()));
            }
        }
        Ok(errors)
    }
}

#[async_trait]
impl Operation for Refute {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        traced(
            logging::Operation::Error,
            &self.expected,
            self.prepare(bindings).await,
            |obj| async move { self.run(ctx, bindings, &obj).await },
        )
        .await
    }
}
