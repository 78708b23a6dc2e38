use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::ObjectKey;

/// Machine-readable reason attached to a failed cluster call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
pub enum StatusReason {
    NotFound,
    AlreadyExists,
    Conflict,
    BadRequest,
    Invalid,
    Forbidden,
    Unauthorized,
    MethodNotAllowed,
    Gone,
    ServerTimeout,
    Timeout,
    TooManyRequests,
    ServiceUnavailable,
    InternalError,
    Unknown,
}

impl StatusReason {
    /// Conditions worth retrying: the same call may succeed a moment later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StatusReason::Conflict
                | StatusReason::ServerTimeout
                | StatusReason::TooManyRequests
                | StatusReason::ServiceUnavailable
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClientError {
    pub reason: StatusReason,
    pub message: String,
}

impl ClientError {
    pub fn new(reason: StatusReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(key: &ObjectKey) -> Self {
        Self::new(
            StatusReason::NotFound,
            format!("{} \"{}\" not found", key.kind, key.name),
        )
    }

    pub fn already_exists(key: &ObjectKey) -> Self {
        Self::new(
            StatusReason::AlreadyExists,
            format!("{} \"{}\" already exists", key.kind, key.name),
        )
    }

    pub fn conflict(key: &ObjectKey, detail: impl Into<String>) -> Self {
        Self::new(
            StatusReason::Conflict,
            format!(
                "Operation cannot be fulfilled on {} \"{}\": {}",
                key.kind,
                key.name,
                detail.into()
            ),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.reason == StatusReason::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.reason == StatusReason::AlreadyExists
    }

    pub fn is_transient(&self) -> bool {
        self.reason.is_transient()
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
