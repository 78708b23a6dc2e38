use std::time::Duration;

use thiserror::Error;

use super::{Client, ClientError, ObjectKey};
use crate::context::{ContextError, ExecutionContext};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaitError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Polls `key` until the cluster reports it gone, starting with an
/// immediate lookup.
pub async fn wait_for_deletion(
    ctx: &ExecutionContext,
    client: &dyn Client,
    key: &ObjectKey,
    interval: Duration,
) -> Result<(), WaitError> {
    let mut poller = ctx.poller(interval);
    loop {
        poller.tick().await?;
        match client.get(key).await {
            Err(e) if e.is_not_found() => {
                poller.confirm()?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
            Ok(_) => tracing::debug!(resource = %key, "waiting for deletion"),
        }
    }
}
