//! The sidecar that gets injected into every managed [`Deployment`].

use k8s_openapi::api::{apps::v1::Deployment, core::v1::Container};
use kube::ResourceExt;

pub const DEFAULT_SIDECAR_IMAGE: &str = "busybox";
pub const SIDECAR_NAME_SUFFIX: &str = "-sidecar";

/// Describes the container that has to be present in a [`Deployment`]'s pod template.
///
/// The container name is derived from the name of the Deployment, everything else is fixed by the
/// policy. The [`Default`] policy runs `sleep 36000` in a `busybox` image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarPolicy {
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
}

impl Default for SidecarPolicy {
    fn default() -> Self {
        Self {
            image: DEFAULT_SIDECAR_IMAGE.to_string(),
            command: vec!["sleep".to_string()],
            args: vec!["36000".to_string()],
        }
    }
}

impl SidecarPolicy {
    /// The sidecar container name for a Deployment called `deployment_name`.
    pub fn container_name(deployment_name: &str) -> String {
        format!("{deployment_name}{SIDECAR_NAME_SUFFIX}")
    }

    /// Builds the sidecar container the given Deployment should carry.
    pub fn desired_container(&self, deployment: &Deployment) -> Container {
        Container {
            name: Self::container_name(&deployment.name_any()),
            image: Some(self.image.clone()),
            command: Some(self.command.clone()),
            args: Some(self.args.clone()),
            ..Container::default()
        }
    }
}

/// Returns `true` if `existing` counts as the `desired` sidecar.
///
/// Only the name and the image are compared. A sidecar with a different command or different
/// arguments is still considered injected and will not be touched.
pub fn is_same_sidecar(existing: &Container, desired: &Container) -> bool {
    existing.name == desired.name && existing.image == desired.image
}

/// The containers of the Deployment's pod template, empty if the template has no spec.
pub fn pod_containers(deployment: &Deployment) -> &[Container] {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod_spec| pod_spec.containers.as_slice())
        .unwrap_or_default()
}

/// Returns `true` if the Deployment's pod template already contains the `desired` sidecar.
pub fn has_sidecar(deployment: &Deployment, desired: &Container) -> bool {
    pod_containers(deployment)
        .iter()
        .any(|container| is_same_sidecar(container, desired))
}

/// Appends `sidecar` to the end of the Deployment's pod template containers.
///
/// Missing `spec` sections are created on the way. Existing containers are left as they are.
pub fn append_sidecar(deployment: &mut Deployment, sidecar: Container) {
    deployment
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
        .containers
        .push(sidecar);
}
