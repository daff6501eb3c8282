use snafu::Snafu;
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    logging::controller::ReconcilerError,
    store::{ResourceId, StoreError},
};

/// Errors that end a reconciliation attempt.
///
/// Concurrent modification and deletion are not errors; they are reported through
/// [`Outcome`](crate::reconciler::Outcome) instead.
#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },

    #[snafu(display("failed to get Deployment {id}"))]
    GetDeployment { id: ResourceId, source: StoreError },

    #[snafu(display(
        "Deployment {id} has no resource version, refusing to write it back unconditionally"
    ))]
    MissingResourceVersion { id: ResourceId },

    #[snafu(display("failed to replace Deployment {id}"))]
    ReplaceDeployment { id: ResourceId, source: StoreError },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}
