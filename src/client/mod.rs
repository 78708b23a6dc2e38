//! # Cluster Client
//!
//! The [`Client`] trait is the only way the engine talks to a cluster. The
//! transport behind it is not part of this crate; [`memory::MemoryClient`]
//! is an in-process cluster used for dry runs and tests.

mod error;
pub mod memory;
mod patch;
mod resource;
mod wait;

pub use error::{ClientError, ClientResult, StatusReason};
pub use patch::{apply_merge_patch, merge_patch};
pub use resource::{ObjectKey, Resource};
pub use wait::{wait_for_deletion, WaitError};

use std::collections::BTreeMap;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

/// Namespace value meaning "every namespace" in a resource reference.
pub const ALL_NAMESPACES: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// `None` lists across all namespaces
    pub namespace: Option<String>,
    /// Equality-based label selector
    pub labels: BTreeMap<String, String>,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
pub enum PropagationPolicy {
    #[default]
    Background,
    Foreground,
    Orphan,
}

#[automock]
#[async_trait]
pub trait Client: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> ClientResult<Resource>;

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        options: &ListOptions,
    ) -> ClientResult<Vec<Resource>>;

    async fn create(&self, obj: &Resource) -> ClientResult<Resource>;

    async fn update(&self, obj: &Resource) -> ClientResult<Resource>;

    /// Applies a JSON merge patch to the resource at `key`.
    async fn patch(&self, key: &ObjectKey, patch: &Value) -> ClientResult<Resource>;

    async fn delete(&self, obj: &Resource, propagation: PropagationPolicy) -> ClientResult<()>;

    async fn is_namespaced(&self, api_version: &str, kind: &str) -> ClientResult<bool>;
}
