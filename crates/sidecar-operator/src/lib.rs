//! A Kubernetes operator that makes sure every watched [`Deployment`] carries a sidecar container.
//!
//! The interesting part lives in [`reconciler`]: each reconciliation fetches the current object,
//! decides whether the sidecar is missing, appends it if so, and writes the object back with an
//! optimistic concurrency check. Conflicting writes are not retried in-process, they are handed
//! back to the [`kube::runtime::Controller`] as a requeue.
//!
//! [`Deployment`]: k8s_openapi::api::apps::v1::Deployment

pub mod cli;
pub mod controller;
pub mod error;
pub mod logging;
pub mod namespace;
pub mod reconciler;
pub mod sidecar;
pub mod store;

// External re-exports
pub use k8s_openapi;
pub use kube;

pub use crate::{
    error::Error,
    reconciler::{NoOpReason, Outcome, Reconciler, RetryReason},
    sidecar::SidecarPolicy,
    store::{DeploymentStore, ResourceId, StoreError},
};
