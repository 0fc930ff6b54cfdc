//! Access to workloads stored in the Kubernetes API.
//!
//! The toggle engine and the waiter only talk to the cluster through [`WorkloadAccessor`], which
//! keeps them independent of [`kube`] and lets tests swap in an in-memory store.

use async_trait::async_trait;
use kube::{
    Api, ResourceExt,
    api::{ListParams, PostParams},
};
use snafu::{ResultExt, Snafu};

use crate::workload::Workload;

#[cfg(test)]
pub(crate) mod fake;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// HTTP status the API server answers with when the submitted resource version is outdated.
const CONFLICT_STATUS_CODE: u16 = 409;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the object has been modified since it was read"))]
    Conflict { source: BoxError },

    #[snafu(display("failed to list objects"))]
    List { source: BoxError },

    #[snafu(display("failed to get object"))]
    Get { source: BoxError },

    #[snafu(display("failed to update object"))]
    Update { source: BoxError },
}

impl Error {
    /// Whether the failed write can be retried after reading the object again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Lists, reads and writes workloads of one kind.
#[async_trait]
pub trait WorkloadAccessor<W: Workload>: Send + Sync {
    /// Retrieves all workloads in the given namespace.
    async fn list(&self, namespace: &str) -> Result<Vec<W>, Error>;

    /// Retrieves a single workload.
    async fn get(&self, namespace: &str, name: &str) -> Result<W, Error>;

    /// Replaces the stored workload.
    ///
    /// Fails with [`Error::Conflict`] if the resource version of `workload` is not the latest one.
    async fn update(&self, namespace: &str, workload: &W) -> Result<W, Error>;
}

/// [`WorkloadAccessor`] for every [`Workload`] kind, backed by a [`kube::Client`].
#[derive(Clone)]
pub struct KubeAccessor {
    client: kube::Client,
    post_params: PostParams,
}

impl KubeAccessor {
    pub fn new(client: kube::Client, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager,
                ..PostParams::default()
            },
        }
    }

    fn api<W: Workload>(&self, namespace: &str) -> Api<W> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<W: Workload> WorkloadAccessor<W> for KubeAccessor {
    async fn list(&self, namespace: &str) -> Result<Vec<W>, Error> {
        let list = self
            .api::<W>(namespace)
            .list(&ListParams::default())
            .await
            .map_err(BoxError::from)
            .context(ListSnafu)?;

        Ok(list.items)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<W, Error> {
        self.api::<W>(namespace)
            .get(name)
            .await
            .map_err(BoxError::from)
            .context(GetSnafu)
    }

    async fn update(&self, namespace: &str, workload: &W) -> Result<W, Error> {
        self.api::<W>(namespace)
            .replace(&workload.name_any(), &self.post_params, workload)
            .await
            .map_err(update_error)
    }
}

/// Separates outdated resource versions, which are worth retrying, from other write failures.
fn update_error(error: kube::Error) -> Error {
    if matches!(&error, kube::Error::Api(response) if response.code == CONFLICT_STATUS_CODE) {
        Error::Conflict {
            source: error.into(),
        }
    } else {
        Error::Update {
            source: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::core::Status;
    use rstest::rstest;

    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            Status::failure("the request was rejected", reason)
                .with_code(code)
                .boxed(),
        )
    }

    #[test]
    fn outdated_resource_version_is_a_conflict() {
        let error = update_error(api_error(409, "Conflict"));

        assert!(error.is_conflict());
        assert!(matches!(error, Error::Conflict { .. }));
    }

    #[rstest]
    #[case::invalid(422, "Invalid")]
    #[case::forbidden(403, "Forbidden")]
    #[case::not_found(404, "NotFound")]
    fn other_api_errors_are_not_retried(#[case] code: u16, #[case] reason: &str) {
        let error = update_error(api_error(code, reason));

        assert!(!error.is_conflict());
        assert!(matches!(error, Error::Update { .. }));
    }
}
