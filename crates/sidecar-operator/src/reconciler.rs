//! Sidecar injection for a single Deployment.
//!
//! Each call to [`Reconciler::reconcile`] is one attempt: it fetches the Deployment, checks whether
//! the sidecar is already there, appends it if not and writes the object back using the resource
//! version it read. Nothing is cached between calls and nothing is retried in-process. If the
//! Deployment changed in the meantime the attempt ends with [`Outcome::RetryRequested`] and the
//! caller is expected to deliver the same Deployment again.

use std::fmt::{self, Display};

use snafu::ResultExt;
use tracing::{debug, field, info};

use crate::{
    error::{Error, GetDeploymentSnafu, MissingResourceVersionSnafu, ReplaceDeploymentSnafu},
    sidecar::{self, SidecarPolicy},
    store::{DeploymentStore, ResourceId, StoreError},
};

/// The result of a reconciliation attempt that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The sidecar was appended and the write was accepted.
    Success,

    /// No write was necessary.
    NoOp(NoOpReason),

    /// The write was rejected because the Deployment changed, the attempt should be repeated.
    RetryRequested(RetryReason),
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("Success"),
            Self::NoOp(reason) => write!(f, "NoOp({reason})"),
            Self::RetryRequested(reason) => write!(f, "RetryRequested({reason})"),
        }
    }
}

#[derive(Clone, Copy, Debug, strum::Display, PartialEq, Eq)]
pub enum NoOpReason {
    /// The Deployment does not exist (anymore).
    Deleted,

    /// The pod template already contains the sidecar.
    AlreadyInjected,
}

#[derive(Clone, Copy, Debug, strum::Display, PartialEq, Eq)]
pub enum RetryReason {
    /// Somebody else wrote the Deployment after it was read.
    Conflict,

    /// The Deployment was deleted after it was read.
    Deleted,
}

/// Injects the sidecar described by a [`SidecarPolicy`] into Deployments read from `S`.
///
/// The reconciler holds no mutable state, so it can be shared between any number of concurrent
/// reconciliations.
pub struct Reconciler<S> {
    store: S,
    policy: SidecarPolicy,
}

impl<S> Reconciler<S>
where
    S: DeploymentStore,
{
    pub fn new(store: S, policy: SidecarPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[tracing::instrument(
        skip(self, id),
        fields(deployment = %id, resource_version = field::Empty)
    )]
    pub async fn reconcile(&self, id: &ResourceId) -> Result<Outcome, Error> {
        let mut deployment = match self.store.get(id).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) | Err(StoreError::NotFound { .. }) => {
                debug!("Deployment does not exist, nothing to do");
                return Ok(Outcome::NoOp(NoOpReason::Deleted));
            }
            Err(source) => return Err(source).context(GetDeploymentSnafu { id: id.clone() }),
        };

        // The version we read is carried along in the metadata and checked by the store on write
        let Some(resource_version) = deployment.metadata.resource_version.as_deref() else {
            return MissingResourceVersionSnafu { id: id.clone() }.fail();
        };
        tracing::Span::current().record("resource_version", resource_version);

        let sidecar = self.policy.desired_container(&deployment);
        if sidecar::has_sidecar(&deployment, &sidecar) {
            debug!(container = %sidecar.name, "sidecar already present");
            return Ok(Outcome::NoOp(NoOpReason::AlreadyInjected));
        }

        let container_name = sidecar.name.clone();
        sidecar::append_sidecar(&mut deployment, sidecar);

        match self.store.replace(id, &deployment).await {
            Ok(_) => {
                info!(container = %container_name, "injected sidecar");
                Ok(Outcome::Success)
            }
            Err(StoreError::Conflict { .. }) => {
                info!("Deployment was modified concurrently, requesting retry");
                Ok(Outcome::RetryRequested(RetryReason::Conflict))
            }
            Err(StoreError::NotFound { .. }) => {
                info!("Deployment was deleted concurrently, requesting retry");
                Ok(Outcome::RetryRequested(RetryReason::Deleted))
            }
            Err(source) => Err(source).context(ReplaceDeploymentSnafu { id: id.clone() }),
        }
    }
}
