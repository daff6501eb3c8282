use std::sync::Arc;

use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{Container, PodSpec, PodTemplateSpec},
};
use sidecar_operator::{
    Error, NoOpReason, Outcome, Reconciler, ResourceId, SidecarPolicy,
    sidecar::{is_same_sidecar, pod_containers},
    store::InMemoryStore,
};

fn container(name: &str, image: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        ..Container::default()
    }
}

fn deployment(containers: Vec<Container>) -> Deployment {
    Deployment {
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers,
                    ..PodSpec::default()
                }),
                ..PodTemplateSpec::default()
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Plays the dispatcher: delivers the same id again for as long as a retry is requested.
async fn reconcile_until_settled(
    reconciler: &Reconciler<Arc<InMemoryStore>>,
    id: &ResourceId,
) -> Result<Outcome, Error> {
    loop {
        match reconciler.reconcile(id).await? {
            Outcome::RetryRequested(_) => tokio::task::yield_now().await,
            outcome => break Ok(outcome),
        }
    }
}

fn sidecar_count(deployment: &Deployment) -> usize {
    let desired = SidecarPolicy::default().desired_container(deployment);
    pod_containers(deployment)
        .iter()
        .filter(|container| is_same_sidecar(container, &desired))
        .count()
}

#[tokio::test]
async fn injects_sidecar_into_single_container_deployment() {
    let store = Arc::new(InMemoryStore::new());
    let id = ResourceId::new("default", "R");
    store
        .insert(&id, deployment(vec![container("app", "app-image")]))
        .await;
    let reconciler = Reconciler::new(store.clone(), SidecarPolicy::default());

    assert_eq!(reconciler.reconcile(&id).await.unwrap(), Outcome::Success);

    let stored = store.peek(&id).await.unwrap();
    assert_eq!(
        pod_containers(&stored),
        [
            container("app", "app-image"),
            Container {
                command: Some(vec!["sleep".to_string()]),
                args: Some(vec!["36000".to_string()]),
                ..container("R-sidecar", "busybox")
            },
        ]
    );
}

#[tokio::test]
async fn leaves_deployment_with_sidecar_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let id = ResourceId::new("default", "R");
    let before = store
        .insert(
            &id,
            deployment(vec![
                container("app", "app-image"),
                container("R-sidecar", "busybox"),
            ]),
        )
        .await;
    let reconciler = Reconciler::new(store.clone(), SidecarPolicy::default());

    assert_eq!(
        reconciler.reconcile(&id).await.unwrap(),
        Outcome::NoOp(NoOpReason::AlreadyInjected)
    );
    assert_eq!(store.replace_count().await, 0);
    assert_eq!(store.peek(&id).await.unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redundant_concurrent_reconciles_inject_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let id = ResourceId::new("default", "web");
    store
        .insert(&id, deployment(vec![container("app", "app-image")]))
        .await;
    let reconciler = Arc::new(Reconciler::new(store.clone(), SidecarPolicy::default()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let reconciler = reconciler.clone();
            let id = id.clone();
            tokio::spawn(async move { reconcile_until_settled(&reconciler, &id).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            Outcome::Success => successes += 1,
            outcome => assert_eq!(outcome, Outcome::NoOp(NoOpReason::AlreadyInjected)),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.replace_count().await, 1);
    let stored = store.peek(&id).await.unwrap();
    assert_eq!(sidecar_count(&stored), 1);
    assert_eq!(pod_containers(&stored).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconciles_many_deployments_concurrently() {
    let store = Arc::new(InMemoryStore::new());
    let ids: Vec<_> = (0..32)
        .map(|i| ResourceId::new(format!("ns-{}", i % 4), format!("app-{i}")))
        .collect();
    for id in &ids {
        store
            .insert(id, deployment(vec![container("app", "app-image")]))
            .await;
    }
    let reconciler = Arc::new(Reconciler::new(store.clone(), SidecarPolicy::default()));

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconcile_until_settled(&reconciler, &id).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Success);
    }

    for id in &ids {
        let stored = store.peek(id).await.unwrap();
        assert_eq!(sidecar_count(&stored), 1);
        assert_eq!(
            pod_containers(&stored).last().map(|c| c.name.clone()),
            Some(format!("{}-sidecar", id.name))
        );
    }
    assert_eq!(store.replace_count().await, ids.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn converges_while_another_writer_keeps_modifying() {
    let store = Arc::new(InMemoryStore::new());
    let id = ResourceId::new("default", "busy");
    store
        .insert(&id, deployment(vec![container("app", "app-image")]))
        .await;
    let reconciler = Reconciler::new(store.clone(), SidecarPolicy::default());

    let writer = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            for generation in 0..50 {
                store
                    .modify(&id, |deployment| {
                        deployment.metadata.labels =
                            Some([("generation".to_string(), generation.to_string())].into());
                    })
                    .await;
                tokio::task::yield_now().await;
            }
        })
    };

    let outcome = reconcile_until_settled(&reconciler, &id).await.unwrap();
    writer.await.unwrap();

    assert!(matches!(
        outcome,
        Outcome::Success | Outcome::NoOp(NoOpReason::AlreadyInjected)
    ));
    let stored = store.peek(&id).await.unwrap();
    assert_eq!(sidecar_count(&stored), 1);
    assert_eq!(
        reconciler.reconcile(&id).await.unwrap(),
        Outcome::NoOp(NoOpReason::AlreadyInjected)
    );
}

#[tokio::test]
async fn deleted_deployment_stays_deleted() {
    let store = Arc::new(InMemoryStore::new());
    let id = ResourceId::new("default", "gone");
    store
        .insert(&id, deployment(vec![container("app", "app-image")]))
        .await;
    store.remove(&id).await;
    let reconciler = Reconciler::new(store.clone(), SidecarPolicy::default());

    assert_eq!(
        reconciler.reconcile(&id).await.unwrap(),
        Outcome::NoOp(NoOpReason::Deleted)
    );
    assert!(store.peek(&id).await.is_none());
    assert_eq!(store.replace_count().await, 0);
}
