//! In-memory resource API.
//!
//! Keeps resources in process memory. Used for dry runs against a captured
//! state and as a scriptable backend in tests: failures can be injected per
//! operation and key, and every call is logged.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::ApiError;
use crate::planner::{OperationKind, Patch};
use crate::resource::{Resource, ResourceKind};

use super::api::{ApiResult, ResourceApi};

/// Resource API backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryApi {
    store: Mutex<Store>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Store {
    resources: BTreeMap<ResourceKind, Vec<Resource>>,
    next_id: u64,
    failures: HashMap<(OperationKind, String), ApiError>,
    list_failure: Option<ApiError>,
    calls: Vec<(OperationKind, String)>,
}

impl InMemoryApi {
    /// Creates an empty API.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds existing resources. Resources without a remote id get one.
    #[must_use]
    pub fn with_resources(self, resources: Vec<Resource>) -> Self {
        for resource in resources {
            self.insert(resource);
        }
        self
    }

    /// Makes one operation on one key fail with `error`.
    #[must_use]
    pub fn with_failure(self, operation: OperationKind, key: &str, error: ApiError) -> Self {
        self.fail_on(operation, key, error);
        self
    }

    /// Makes every listing fail with `error`.
    #[must_use]
    pub fn with_list_failure(self, error: ApiError) -> Self {
        self.store().list_failure = Some(error);
        self
    }

    /// Delays every create, update and delete.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes one operation on one key fail with `error`.
    pub fn fail_on(&self, operation: OperationKind, key: &str, error: ApiError) {
        self.store()
            .failures
            .insert((operation, key.to_string()), error);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        let mut store = self.store();
        store.failures.clear();
        store.list_failure = None;
    }

    /// Adds or replaces a resource, as if changed outside the engine.
    pub fn insert(&self, mut resource: Resource) {
        let mut store = self.store();
        if resource.remote_id.is_none() {
            resource.remote_id = Some(store.assign_id(resource.kind));
        }
        let entries = store.resources.entry(resource.kind).or_default();
        entries.retain(|r| r.remote_id != resource.remote_id);
        entries.push(resource);
    }

    /// Returns the stored resources of a kind, sorted by key.
    #[must_use]
    pub fn snapshot(&self, kind: ResourceKind) -> Vec<Resource> {
        let mut resources = self
            .store()
            .resources
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        resources.sort_by(|a, b| a.key.cmp(&b.key));
        resources
    }

    /// Returns every create, update and delete received, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<(OperationKind, String)> {
        self.store().calls.clone()
    }

    /// Forgets the call log.
    pub fn reset_calls(&self) {
        self.store().calls.clear();
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Store {
    fn assign_id(&mut self, kind: ResourceKind) -> String {
        self.next_id += 1;
        format!("{}_{:04}", kind.collection_path(), self.next_id)
    }

    fn record(&mut self, operation: OperationKind, key: &str) -> ApiResult<()> {
        self.calls.push((operation, key.to_string()));
        self.failures
            .get(&(operation, key.to_string()))
            .map_or(Ok(()), |e| Err(e.clone()))
    }

    fn position(&self, kind: ResourceKind, remote_id: &str) -> ApiResult<usize> {
        self.resources
            .get(&kind)
            .and_then(|entries| {
                entries
                    .iter()
                    .position(|r| r.remote_id.as_deref() == Some(remote_id))
            })
            .ok_or_else(|| ApiError::NotFound {
                remote_id: remote_id.to_string(),
            })
    }
}

#[async_trait]
impl ResourceApi for InMemoryApi {
    async fn list(&self, kind: ResourceKind) -> ApiResult<Vec<Resource>> {
        let store = self.store();
        if let Some(error) = &store.list_failure {
            return Err(error.clone());
        }
        Ok(store.resources.get(&kind).cloned().unwrap_or_default())
    }

    async fn create(&self, resource: &Resource) -> ApiResult<String> {
        self.pause().await;
        let mut store = self.store();
        store.record(OperationKind::Create, &resource.key)?;

        let remote_id = store.assign_id(resource.kind);
        let mut created = resource.clone();
        created.remote_id = Some(remote_id.clone());
        store.resources.entry(resource.kind).or_default().push(created);
        Ok(remote_id)
    }

    async fn update(&self, kind: ResourceKind, remote_id: &str, patch: &Patch) -> ApiResult<()> {
        self.pause().await;
        let mut store = self.store();
        let index = store.position(kind, remote_id)?;
        let key = store.resources[&kind][index].key.clone();
        store.record(OperationKind::Update, &key)?;

        if let Some(entries) = store.resources.get_mut(&kind) {
            for (field, value) in patch.fields() {
                entries[index].fields.insert(field.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, remote_id: &str) -> ApiResult<()> {
        self.pause().await;
        let mut store = self.store();
        let index = store.position(kind, remote_id)?;
        let key = store.resources[&kind][index].key.clone();
        store.record(OperationKind::Delete, &key)?;

        if let Some(entries) = store.resources.get_mut(&kind) {
            entries.remove(index);
        }
        Ok(())
    }
}
