use async_trait::async_trait;

use super::internal::expand;
use super::{Operation, OperationResult, Process};
use crate::bindings::Bindings;
use crate::context::ExecutionContext;
use crate::logging;

/// Runs an entrypoint with arguments. `$VAR` and `${VAR}` in arguments are
/// expanded from the declared env and the process environment.
#[derive(Debug, Clone)]
pub struct Command {
    process: Process,
    entrypoint: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(process: Process, entrypoint: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            process,
            entrypoint: entrypoint.into(),
            args,
        }
    }

    async fn run(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        let envs = self.process.envs(bindings)?;
        let args = self
            .args
            .iter()
            .map(|arg| expand(&envs, arg).into_owned())
            .collect();
        self.process
            .run(
                ctx,
                bindings,
                logging::Operation::Command,
                &self.entrypoint,
                args,
                envs,
            )
            .await
    }
}

#[async_trait]
impl Operation for Command {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        let result = self.run(ctx, bindings).await;
        logging::log_end(logging::Operation::Command, None, &result);
        result
    }
}
