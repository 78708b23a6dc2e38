use std::time::Duration;

use async_trait::async_trait;

use super::{Operation, OperationResult};
use crate::bindings::Bindings;
use crate::context::ExecutionContext;
use crate::logging;
use crate::outputs::Outputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Operation for Sleep {
    async fn exec(&self, ctx: &ExecutionContext, _bindings: &Bindings) -> OperationResult {
        logging::log_start(logging::Operation::Sleep, None);
        let result = ctx
            .sleep(self.duration)
            .await
            .map(|_| Outputs::new())
            .map_err(Into::into);
        logging::log_end(logging::Operation::Sleep, None, &result);
        result
    }
}
