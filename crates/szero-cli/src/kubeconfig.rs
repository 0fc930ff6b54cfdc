//! Resolves the cluster to talk to from a kubeconfig.

use std::path::{Path, PathBuf};

use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read kubeconfig from {path:?}"))]
    ReadFile {
        source: KubeconfigError,
        path: PathBuf,
    },

    #[snafu(display("failed to read the default kubeconfig"))]
    ReadDefault { source: KubeconfigError },

    #[snafu(display("failed to load context {context:?} from the kubeconfig"))]
    LoadContext {
        source: KubeconfigError,
        context: String,
    },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },
}

/// A client for the selected cluster, together with the namespace the selected context points
/// to.
pub struct Cluster {
    pub client: kube::Client,
    pub default_namespace: String,
}

/// Connects to the cluster of `context`, or of the current context if none is given.
///
/// Without an explicit `path`, the kubeconfig is located the same way kubectl does it, through
/// `$KUBECONFIG` or `~/.kube/config`.
pub async fn connect(path: Option<&Path>, context: Option<&str>) -> Result<Cluster, Error> {
    let kubeconfig = match path {
        Some(path) => Kubeconfig::read_from(path).context(ReadFileSnafu { path })?,
        None => Kubeconfig::read().context(ReadDefaultSnafu)?,
    };

    let context = context
        .map(ToOwned::to_owned)
        .or_else(|| kubeconfig.current_context.clone())
        .unwrap_or_default();
    let options = KubeConfigOptions {
        context: (!context.is_empty()).then(|| context.clone()),
        ..KubeConfigOptions::default()
    };

    // The namespace of the context ends up as the default namespace, falling back to "default".
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context(LoadContextSnafu { context: &context })?;
    let default_namespace = config.default_namespace.clone();

    tracing::debug!(
        context,
        cluster_url = %config.cluster_url,
        default_namespace,
        "Loaded kubeconfig"
    );

    let client = kube::Client::try_from(config).context(CreateClientSnafu)?;

    Ok(Cluster {
        client,
        default_namespace,
    })
}
