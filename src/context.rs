//! Cancellable, deadline-scoped execution context.
//!
//! Every suspension point of the engine (poll intervals, sleeps, process
//! execution) goes through an [`ExecutionContext`] so that a deadline or an
//! explicit cancel unblocks it promptly.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child context that expires after `timeout`, or earlier if the parent
    /// does. Cancelling the parent cancels the child, not the other way round.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            deadline: Some(match self.deadline {
                Some(parent) if parent < deadline => parent,
                _ => deadline,
            }),
            token: self.token.child_token(),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        if let Some(e) = self.err() {
            return Err(e);
        }
        tokio::select! {
            e = self.done() => Err(e),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub fn poller(&self, interval: Duration) -> Poller<'_> {
        Poller {
            ctx: self,
            interval,
            started: false,
        }
    }
}

/// Fixed-interval ticker bound to a context.
#[derive(Debug)]
pub struct Poller<'a> {
    ctx: &'a ExecutionContext,
    interval: Duration,
    started: bool,
}

impl Poller<'_> {
    /// Waits for the next attempt. The first call returns at once.
    pub async fn tick(&mut self) -> Result<(), ContextError> {
        if !self.started {
            self.started = true;
            return match self.ctx.err() {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        self.ctx.sleep(self.interval).await
    }

    /// Called after an attempt reports success: a context that ended in the
    /// meantime still wins.
    pub fn confirm(&self) -> Result<(), ContextError> {
        match self.ctx.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
