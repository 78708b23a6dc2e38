use async_trait::async_trait;

use super::{Operation, OperationResult, Process};
use crate::bindings::Bindings;
use crate::context::ExecutionContext;
use crate::logging;

/// Runs a script body through a shell, `sh -c` by default.
#[derive(Debug, Clone)]
pub struct Script {
    process: Process,
    content: String,
    shell: String,
    shell_args: Vec<String>,
}

impl Script {
    pub fn new(process: Process, content: impl Into<String>) -> Self {
        Self {
            process,
            content: content.into(),
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>, args: Vec<String>) -> Self {
        self.shell = shell.into();
        if !args.is_empty() {
            self.shell_args = args;
        }
        self
    }

    async fn run(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        let envs = self.process.envs(bindings)?;
        let mut args = self.shell_args.clone();
        args.push(self.content.clone());
        self.process
            .run(ctx, bindings, logging::Operation::Script, &self.shell, args, envs)
            .await
    }
}

#[async_trait]
impl Operation for Script {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult {
        let result = self.run(ctx, bindings).await;
        logging::log_end(logging::Operation::Script, None, &result);
        result
    }
}
