use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, api::PostParams, client::Client as KubeClient};

use crate::store::{DeploymentStore, ResourceId, StoreError};

/// HTTP status the API server answers with when the object does not exist.
const STATUS_NOT_FOUND: u16 = 404;
/// HTTP status the API server answers with when the resource version is outdated.
const STATUS_CONFLICT: u16 = 409;

/// A [`DeploymentStore`] backed by the Kubernetes API server.
///
/// It wraps an underlying [`kube::client::Client`] and sends all writes with the configured field
/// manager.
#[derive(Clone)]
pub struct KubeStore {
    client: KubeClient,
    post_params: PostParams,
}

impl KubeStore {
    pub fn new(client: KubeClient, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager,
                ..PostParams::default()
            },
        }
    }

    fn api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DeploymentStore for KubeStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<Deployment>, StoreError> {
        tracing::trace!(deployment = %id, "fetching Deployment");
        self.api(&id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(|source| classify_error(id, source))
    }

    async fn replace(
        &self,
        id: &ResourceId,
        deployment: &Deployment,
    ) -> Result<Deployment, StoreError> {
        tracing::trace!(
            deployment = %id,
            resource_version = deployment.metadata.resource_version.as_deref(),
            "replacing Deployment"
        );
        self.api(&id.namespace)
            .replace(&id.name, &self.post_params, deployment)
            .await
            .map_err(|source| classify_error(id, source))
    }
}

/// Maps the API status of a failed request onto the [`StoreError`] taxonomy.
fn classify_error(id: &ResourceId, source: kube::Error) -> StoreError {
    let status_code = match &source {
        kube::Error::Api(status) => Some(status.code),
        _ => None,
    };
    match status_code {
        Some(STATUS_NOT_FOUND) => StoreError::NotFound { id: id.clone() },
        Some(STATUS_CONFLICT) => StoreError::Conflict { id: id.clone() },
        _ => StoreError::Kube {
            id: id.clone(),
            source: Box::new(source),
        },
    }
}

#[cfg(test)]
mod tests {
    use kube::core::Status;
    use rstest::rstest;

    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Status::failure("request failed", reason).with_code(code).boxed())
    }

    #[rstest]
    #[case::not_found(api_error(404, "NotFound"), "NotFound")]
    #[case::conflict(api_error(409, "Conflict"), "Conflict")]
    #[case::internal(api_error(500, "InternalError"), "Kube")]
    #[case::forbidden(api_error(403, "Forbidden"), "Kube")]
    #[case::transport(kube::Error::Service("connection refused".into()), "Kube")]
    fn api_errors_are_classified_by_status_code(
        #[case] source: kube::Error,
        #[case] expected: &str,
    ) {
        let id = ResourceId::new("default", "web");

        let classified = match classify_error(&id, source) {
            StoreError::NotFound { id } => ("NotFound", id),
            StoreError::Conflict { id } => ("Conflict", id),
            StoreError::Kube { id, .. } => ("Kube", id),
            StoreError::Unavailable { id, .. } => ("Unavailable", id),
        };

        assert_eq!(classified, (expected, ResourceId::new("default", "web")));
    }

    #[test]
    fn unclassified_errors_keep_the_api_status() {
        let id = ResourceId::new("default", "web");

        let classified = classify_error(&id, api_error(500, "InternalError"));

        assert!(matches!(
            classified,
            StoreError::Kube { ref source, .. }
                if matches!(**source, kube::Error::Api(ref status) if status.code == 500)
        ));
    }
}
