//! Wires the [`Reconciler`] into a [`kube::runtime::Controller`] watching Deployments.
//!
//! The controller only uses the watched objects to learn which Deployment to look at. The
//! reconciler always fetches the current revision itself.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, future};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Client,
    runtime::{
        Controller,
        controller::Action,
        events::{Recorder, Reporter},
        watcher,
    },
};
use snafu::OptionExt;

use crate::{
    cli::RunArguments,
    error::{Error, MissingObjectKeySnafu},
    logging::controller::report_controller_reconciled,
    reconciler::{Outcome, Reconciler},
    sidecar::SidecarPolicy,
    store::{DeploymentStore, KubeStore, ResourceId},
};

pub const CONTROLLER_NAME: &str = "deployment-sidecar";

/// How long to wait before a Deployment is delivered again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequeueDelays {
    /// After the write-back lost against a concurrent writer
    pub conflict: Duration,
    /// After a failed reconciliation
    pub error: Duration,
}

pub struct Ctx<S> {
    pub reconciler: Reconciler<S>,
    pub requeue: RequeueDelays,
}

impl RequeueDelays {
    /// Maps the outcome of a reconciliation onto the action the controller should take.
    ///
    /// Successful writes and no-ops wait for the next change. The write itself produces a watch
    /// event, so the injected sidecar is verified by a follow-up reconciliation.
    pub fn action_for(&self, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Success | Outcome::NoOp(_) => Action::await_change(),
            Outcome::RetryRequested(_) => Action::requeue(self.conflict),
        }
    }
}

/// Runs the controller until the process receives a shutdown signal.
pub async fn run_controller(client: Client, args: RunArguments) {
    let store = KubeStore::new(client.clone(), Some(args.field_manager.clone()));
    let ctx = Arc::new(Ctx {
        reconciler: Reconciler::new(store, SidecarPolicy::default()),
        requeue: RequeueDelays {
            conflict: args.conflict_requeue_delay,
            error: args.error_requeue_delay,
        },
    });
    let recorder = Recorder::new(
        client.clone(),
        Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        },
    );

    tracing::info!(
        controller.name = CONTROLLER_NAME,
        watch_namespace = ?args.watch_namespace,
        "starting controller"
    );

    Controller::new(
        args.watch_namespace.get_api::<Deployment>(&client),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(reconcile::<KubeStore>, error_policy::<KubeStore>, ctx)
    .for_each(|result| {
        report_controller_reconciled(&recorder, CONTROLLER_NAME, &result);
        future::ready(())
    })
    .await;
}

/// Reconciles the Deployment the controller delivered.
pub async fn reconcile<S>(deployment: Arc<Deployment>, ctx: Arc<Ctx<S>>) -> Result<Action, Error>
where
    S: DeploymentStore + 'static,
{
    let id = resource_id(&deployment)?;
    let outcome = ctx.reconciler.reconcile(&id).await?;
    tracing::debug!(deployment = %id, %outcome, "reconciliation finished");
    Ok(ctx.requeue.action_for(outcome))
}

#[allow(clippy::needless_pass_by_value)]
pub fn error_policy<S>(_deployment: Arc<Deployment>, error: &Error, ctx: Arc<Ctx<S>>) -> Action {
    tracing::warn!(
        error = error as &dyn std::error::Error,
        retry_in = ?ctx.requeue.error,
        "reconciliation failed, requeueing"
    );
    Action::requeue(ctx.requeue.error)
}

fn resource_id(deployment: &Deployment) -> Result<ResourceId, Error> {
    let name = deployment
        .metadata
        .name
        .as_deref()
        .context(MissingObjectKeySnafu {
            key: "metadata.name",
        })?;
    let namespace = deployment
        .metadata
        .namespace
        .as_deref()
        .context(MissingObjectKeySnafu {
            key: "metadata.namespace",
        })?;
    Ok(ResourceId::new(namespace, name))
}
