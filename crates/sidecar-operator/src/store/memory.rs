use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{
    ConflictSnafu, DeploymentStore, NotFoundSnafu, ResourceId, StoreError, UnavailableSnafu,
};

/// In-memory [`DeploymentStore`] with the same optimistic concurrency rules as the API server
///
/// Every accepted write assigns a fresh `metadata.resourceVersion`. Writes that carry an outdated
/// resource version are rejected with [`StoreError::Conflict`]. The version check and the write
/// happen under one lock, so a replace is atomic.
///
/// Besides the [`DeploymentStore`] operations it exposes helpers that act like an external client,
/// so tests can create, modify and delete objects behind the reconciler's back.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceId, Deployment>,
    last_version: u64,
    replace_count: usize,
    fail_next_get: Option<String>,
    fail_next_replace: Option<String>,
}

impl State {
    fn store(&mut self, id: &ResourceId, mut deployment: Deployment) -> Deployment {
        self.last_version += 1;
        deployment.metadata.name = Some(id.name.clone());
        deployment.metadata.namespace = Some(id.namespace.clone());
        deployment.metadata.resource_version = Some(self.last_version.to_string());
        self.objects.insert(id.clone(), deployment.clone());
        deployment
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites the object as an external client would, returning the stored revision.
    pub async fn insert(&self, id: &ResourceId, deployment: Deployment) -> Deployment {
        self.state.write().await.store(id, deployment)
    }

    /// Deletes the object, returning its last revision if it existed.
    pub async fn remove(&self, id: &ResourceId) -> Option<Deployment> {
        self.state.write().await.objects.remove(id)
    }

    /// Applies `modify` to the stored object and stores the result as a new revision.
    ///
    /// Returns [`None`] if the object does not exist.
    pub async fn modify(
        &self,
        id: &ResourceId,
        modify: impl FnOnce(&mut Deployment) + Send,
    ) -> Option<Deployment> {
        let mut state = self.state.write().await;
        let mut deployment = state.objects.get(id)?.clone();
        modify(&mut deployment);
        Some(state.store(id, deployment))
    }

    /// Returns the current revision of the object without going through [`DeploymentStore`].
    pub async fn peek(&self, id: &ResourceId) -> Option<Deployment> {
        self.state.read().await.objects.get(id).cloned()
    }

    /// The number of replace requests that were accepted so far.
    pub async fn replace_count(&self) -> usize {
        self.state.read().await.replace_count
    }

    /// Makes the next [`DeploymentStore::get`] fail with [`StoreError::Unavailable`].
    pub async fn fail_next_get(&self, reason: impl Into<String>) {
        self.state.write().await.fail_next_get = Some(reason.into());
    }

    /// Makes the next [`DeploymentStore::replace`] fail with [`StoreError::Unavailable`].
    pub async fn fail_next_replace(&self, reason: impl Into<String>) {
        self.state.write().await.fail_next_replace = Some(reason.into());
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Deployment>, StoreError> {
        let mut state = self.state.write().await;
        if let Some(reason) = state.fail_next_get.take() {
            return UnavailableSnafu {
                id: id.clone(),
                reason,
            }
            .fail();
        }
        Ok(state.objects.get(id).cloned())
    }

    async fn replace(
        &self,
        id: &ResourceId,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        let mut state = self.state.write().await;
        if let Some(reason) = state.fail_next_replace.take() {
            return UnavailableSnafu {
                id: id.clone(),
                reason,
            }
            .fail();
        }

        let Some(current) = state.objects.get(id) else {
            return NotFoundSnafu { id: id.clone() }.fail();
        };

        // Like the API server, a write without a resource version is unconditional
        if let Some(expected) = deployment.metadata.resource_version.as_deref() {
            let actual = current.metadata.resource_version.as_deref();
            if actual != Some(expected) {
                debug!(
                    deployment = %id,
                    expected,
                    actual,
                    "rejecting write with outdated resource version"
                );
                return ConflictSnafu { id: id.clone() }.fail();
            }
        }

        state.replace_count += 1;
        Ok(state.store(id, deployment.clone()))
    }
}
