//! The backing store that [`Deployment`]s are read from and written back to.
//!
//! The store is treated as a remote, versioned, optimistically concurrent key/value store: every
//! write carries the `metadata.resourceVersion` that was read and is rejected if the object has
//! changed in the meantime.

use std::fmt::{self, Display};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use snafu::Snafu;

pub mod kubernetes;
pub mod memory;

pub use self::{kubernetes::KubeStore, memory::InMemoryStore};

/// Identifies a namespaced object by its namespace and name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("object {id} was not found"))]
    NotFound { id: ResourceId },

    #[snafu(display("object {id} was modified concurrently"))]
    Conflict { id: ResourceId },

    #[snafu(display("Kubernetes request for {id} failed"))]
    Kube {
        id: ResourceId,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("store for {id} is unavailable: {reason}"))]
    Unavailable { id: ResourceId, reason: String },
}

/// Read and write access to [`Deployment`]s.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Fetches the current revision of the Deployment, or [`None`] if it does not exist.
    async fn get(&self, id: &ResourceId) -> Result<Option<Deployment>, StoreError>;

    /// Replaces the Deployment with `deployment`.
    ///
    /// The write is only accepted if `deployment.metadata.resource_version` still matches the
    /// stored revision, otherwise [`StoreError::Conflict`] is returned. A Deployment that has
    /// been deleted in the meantime yields [`StoreError::NotFound`].
    async fn replace(
        &self,
        id: &ResourceId,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError>;
}

#[async_trait]
impl<S> DeploymentStore for std::sync::Arc<S>
where
    S: DeploymentStore + ?Sized,
{
    async fn get(&self, id: &ResourceId) -> Result<Option<Deployment>, StoreError> {
        (**self).get(id).await
    }

    async fn replace(
        &self,
        id: &ResourceId,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        (**self).replace(id, deployment).await
    }
}
