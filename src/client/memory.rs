//! In-process cluster.
//!
//! Stores resources in memory and implements the [`Client`] contract closely
//! enough for dry runs and tests: optimistic concurrency on
//! `resourceVersion`, merge patches, label-selector listing and
//! namespace-scope introspection. Faults can be injected per verb and
//! deletions can be made to linger for a number of reads.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::Value;
use strum_macros::Display;
use tokio::sync::Mutex;

use super::{
    apply_merge_patch, Client, ClientError, ClientResult, ListOptions, ObjectKey,
    PropagationPolicy, Resource, StatusReason,
};

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Patch,
    Delete,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    /// Deleted objects still visible for this many reads
    terminating: HashMap<ObjectKey, usize>,
    faults: HashMap<Verb, VecDeque<ClientError>>,
    calls: HashMap<Verb, usize>,
    cluster_scoped: HashSet<String>,
    unknown_kinds: HashSet<String>,
    deletion_delay: usize,
    version: u64,
}

impl State {
    fn record(&mut self, verb: Verb) -> ClientResult<()> {
        *self.calls.entry(verb).or_default() += 1;
        match self.faults.get_mut(&verb).and_then(VecDeque::pop_front) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn check_kind(&self, kind: &str) -> ClientResult<()> {
        if self.unknown_kinds.contains(kind) {
            return Err(ClientError::new(
                StatusReason::NotFound,
                format!("no matches for kind \"{}\"", kind),
            ));
        }
        Ok(())
    }

    /// Counts a read against lingering deletions, dropping expired ones.
    fn observe(&mut self, key: &ObjectKey) {
        if let Some(remaining) = self.terminating.get_mut(key) {
            if *remaining == 0 {
                self.terminating.remove(key);
                self.objects.remove(key);
            } else {
                *remaining -= 1;
            }
        }
    }

    fn normalize(&self, key: ObjectKey) -> ObjectKey {
        if self.cluster_scoped.contains(&key.kind) {
            ObjectKey {
                namespace: String::new(),
                ..key
            }
        } else {
            key
        }
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        let state = State {
            cluster_scoped: CLUSTER_SCOPED_KINDS.iter().map(|k| k.to_string()).collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store without going through `create`.
    pub async fn insert(&self, obj: Value) {
        let mut state = self.state.lock().await;
        let mut resource = Resource::new(obj);
        let version = state.next_version();
        resource.set_resource_version(Some(&version));
        let key = state.normalize(resource.key());
        state.objects.insert(key, resource.into_value());
    }

    /// Makes the next `times` calls of `verb` fail with `error`.
    pub async fn fail(&self, verb: Verb, error: ClientError, times: usize) {
        let mut state = self.state.lock().await;
        let queue = state.faults.entry(verb).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    pub async fn calls(&self, verb: Verb) -> usize {
        self.state.lock().await.calls.get(&verb).copied().unwrap_or(0)
    }

    /// Deleted resources stay readable for `reads` more reads.
    pub async fn set_deletion_delay(&self, reads: usize) {
        self.state.lock().await.deletion_delay = reads;
    }

    pub async fn add_cluster_scoped_kind(&self, kind: &str) {
        self.state.lock().await.cluster_scoped.insert(kind.to_string());
    }

    /// Kinds that discovery does not know about.
    pub async fn add_unknown_kind(&self, kind: &str) {
        self.state.lock().await.unknown_kinds.insert(kind.to_string());
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn matches_labels(obj: &Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = Resource::new(obj.clone()).labels();
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait]
impl Client for MemoryClient {
    async fn get(&self, key: &ObjectKey) -> ClientResult<Resource> {
        let mut state = self.state.lock().await;
        state.record(Verb::Get)?;
        state.check_kind(&key.kind)?;
        let key = state.normalize(key.clone());
        state.observe(&key);
        state
            .objects
            .get(&key)
            .cloned()
            .map(Resource::new)
            .ok_or_else(|| ClientError::not_found(&key))
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        options: &ListOptions,
    ) -> ClientResult<Vec<Resource>> {
        let mut state = self.state.lock().await;
        state.record(Verb::List)?;
        state.check_kind(kind)?;
        let keys: Vec<ObjectKey> = state
            .objects
            .keys()
            .filter(|key| key.api_version == api_version && key.kind == kind)
            .filter(|key| match &options.namespace {
                Some(namespace) => &key.namespace == namespace,
                None => true,
            })
            .cloned()
            .collect();
        let mut out = Vec::new();
        for key in keys {
            state.observe(&key);
            if let Some(obj) = state.objects.get(&key) {
                if matches_labels(obj, &options.labels) {
                    out.push(Resource::new(obj.clone()));
                }
            }
        }
        Ok(out)
    }

    async fn create(&self, obj: &Resource) -> ClientResult<Resource> {
        let mut state = self.state.lock().await;
        state.record(Verb::Create)?;
        state.check_kind(obj.kind())?;
        if obj.name().is_empty() {
            return Err(ClientError::new(
                StatusReason::Invalid,
                "metadata.name: Required value",
            ));
        }
        let key = state.normalize(obj.key());
        if state.objects.contains_key(&key) {
            return Err(ClientError::already_exists(&key));
        }
        let mut created = obj.clone();
        let version = state.next_version();
        created.set_resource_version(Some(&version));
        state.objects.insert(key, created.as_value().clone());
        Ok(created)
    }

    async fn update(&self, obj: &Resource) -> ClientResult<Resource> {
        let mut state = self.state.lock().await;
        state.record(Verb::Update)?;
        let key = state.normalize(obj.key());
        let current = state
            .objects
            .get(&key)
            .map(|v| Resource::new(v.clone()))
            .ok_or_else(|| ClientError::not_found(&key))?;
        if let Some(version) = obj.resource_version() {
            if Some(version) != current.resource_version() {
                return Err(ClientError::conflict(
                    &key,
                    "the object has been modified; please apply your changes to the latest version and try again",
                ));
            }
        }
        let mut updated = obj.clone();
        let version = state.next_version();
        updated.set_resource_version(Some(&version));
        state.objects.insert(key, updated.as_value().clone());
        Ok(updated)
    }

    async fn patch(&self, key: &ObjectKey, patch: &Value) -> ClientResult<Resource> {
        let mut state = self.state.lock().await;
        state.record(Verb::Patch)?;
        let key = state.normalize(key.clone());
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(&key))?;
        let current_version = Resource::new(current.clone())
            .resource_version()
            .map(str::to_string);
        let requested = Resource::new(patch.clone())
            .resource_version()
            .map(str::to_string);
        if requested.is_some() && requested != current_version {
            return Err(ClientError::conflict(&key, "the object has been modified"));
        }
        let mut patched = current.clone();
        apply_merge_patch(&mut patched, patch);
        if patched == current {
            return Ok(Resource::new(current));
        }
        let mut patched = Resource::new(patched);
        let version = state.next_version();
        patched.set_resource_version(Some(&version));
        state.objects.insert(key, patched.as_value().clone());
        Ok(patched)
    }

    async fn delete(&self, obj: &Resource, _propagation: PropagationPolicy) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        state.record(Verb::Delete)?;
        let key = state.normalize(obj.key());
        if !state.objects.contains_key(&key) || state.terminating.contains_key(&key) {
            return Err(ClientError::not_found(&key));
        }
        if state.deletion_delay == 0 {
            state.objects.remove(&key);
        } else {
            let delay = state.deletion_delay;
            state.terminating.insert(key, delay);
        }
        Ok(())
    }

    async fn is_namespaced(&self, _api_version: &str, kind: &str) -> ClientResult<bool> {
        let state = self.state.lock().await;
        state.check_kind(kind)?;
        Ok(!state.cluster_scoped.contains(kind))
    }
}
