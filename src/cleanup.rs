//! Per-test teardown of created resources.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::client::{wait_for_deletion, Client, PropagationPolicy, Resource, WaitError};
use crate::context::ExecutionContext;
use crate::logging::{self, Operation, Status};

struct Entry {
    client: Arc<dyn Client>,
    resource: Resource,
}

/// Append-only collector of created resources.
///
/// Clones share the same entries, so a cleaner can be handed to every
/// operation of a test and run once when the test ends.
#[derive(Clone)]
pub struct Cleaner {
    entries: Arc<Mutex<Vec<Entry>>>,
    timeout: Duration,
    delay: Option<Duration>,
    propagation: PropagationPolicy,
    poll_interval: Duration,
}

impl fmt::Debug for Cleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleaner")
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .field("propagation", &self.propagation)
            .finish_non_exhaustive()
    }
}

impl Cleaner {
    pub fn new(timeout: Duration, delay: Option<Duration>, propagation: PropagationPolicy) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            timeout,
            delay,
            propagation,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn add(&self, client: Arc<dyn Client>, resource: Resource) {
        self.entries.lock().await.push(Entry { client, resource });
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Deletes every registered resource, newest first, waiting for each to
    /// be gone before moving on. Failures are collected, not fatal.
    pub async fn run(&self, ctx: &ExecutionContext) -> Vec<WaitError> {
        let entries = std::mem::take(&mut *self.entries.lock().await);
        if entries.is_empty() {
            return Vec::new();
        }
        logging::log(Operation::Cleanup, Status::Begin, None, "");
        if let Some(delay) = self.delay {
            if let Err(e) = ctx.sleep(delay).await {
                tracing::warn!("cleanup delay interrupted: {}", e);
            }
        }
        let mut errors = Vec::new();
        for entry in entries.iter().rev() {
            let key = entry.resource.key();
            logging::log_start(Operation::Delete, Some(&key));
            let result = self.delete(ctx, entry).await;
            logging::log_end(Operation::Delete, Some(&key), &result);
            if let Err(e) = result {
                errors.push(e);
            }
        }
        logging::log(Operation::Cleanup, Status::End, None, "");
        errors
    }

    async fn delete(&self, ctx: &ExecutionContext, entry: &Entry) -> Result<(), WaitError> {
        let ctx = ctx.with_timeout(self.timeout);
        match entry.client.delete(&entry.resource, self.propagation).await {
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
            Ok(()) => {
                wait_for_deletion(
                    &ctx,
                    entry.client.as_ref(),
                    &entry.resource.key(),
                    self.poll_interval,
                )
                .await
            }
        }
    }
}
