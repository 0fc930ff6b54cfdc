//! Runs a toggle over every selected kind in every selected namespace.

use std::{sync::Arc, time::Duration};

use itertools::Itertools;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use snafu::{ResultExt, Snafu};
use szero::{
    client::{self, KubeAccessor, WorkloadAccessor},
    toggle::{self, Operation, ToggleEngine},
    wait::{self, ReconciliationWait},
    workload::{Restartable, Workload, WorkloadKind},
};

use crate::cli::{ClusterOptions, KindOptions};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to list {kind}s in namespace {namespace:?}"))]
    List {
        source: client::Error,
        kind: WorkloadKind,
        namespace: String,
    },

    #[snafu(display("failed to change workloads in namespace {namespace:?}"))]
    Batch {
        source: toggle::BatchError,
        namespace: String,
    },

    #[snafu(display("failed to wait for workloads to reach their new state"))]
    Wait { source: wait::Error },
}

/// Which workload kinds a command touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KindSelection {
    pub deployments: bool,
    pub stateful_sets: bool,
    pub daemon_sets: bool,
}

impl From<&KindOptions> for KindSelection {
    fn from(options: &KindOptions) -> Self {
        Self {
            deployments: !options.skip_deployments,
            stateful_sets: !options.skip_statefulsets,
            daemon_sets: !options.skip_daemonsets,
        }
    }
}

/// Everything a command needs to know, resolved once from the command line and the kubeconfig.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub namespaces: Vec<String>,
    pub kinds: KindSelection,

    /// Wait for the workloads to settle after toggling, at most for the given time.
    pub wait_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(
        cluster: &ClusterOptions,
        kinds: &KindOptions,
        default_namespace: &str,
        wait_timeout: Option<Duration>,
    ) -> Self {
        let mut namespaces = cluster
            .namespaces
            .iter()
            .map(String::as_str)
            .map(str::trim)
            .filter(|namespace| !namespace.is_empty())
            .unique()
            .map(ToOwned::to_owned)
            .collect_vec();
        if namespaces.is_empty() {
            namespaces.push(default_namespace.to_owned());
        }

        Self {
            namespaces,
            kinds: kinds.into(),
            wait_timeout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

impl Direction {
    fn operation(self) -> Operation {
        match self {
            Self::Down => Operation::Downscale,
            Self::Up => Operation::Upscale,
        }
    }
}

pub async fn downscale(accessor: KubeAccessor, config: &RunConfig) -> Result<(), Error> {
    scale(Direction::Down, accessor, config).await
}

pub async fn upscale(accessor: KubeAccessor, config: &RunConfig) -> Result<(), Error> {
    scale(Direction::Up, accessor, config).await
}

/// Restarts Deployments and StatefulSets. DaemonSets are never restarted.
pub async fn restart(accessor: KubeAccessor, config: &RunConfig) -> Result<(), Error> {
    let engine = ToggleEngine::new(accessor);

    for namespace in &config.namespaces {
        if config.kinds.deployments {
            restart_kind::<Deployment>(&engine, namespace).await?;
        }
        if config.kinds.stateful_sets {
            restart_kind::<StatefulSet>(&engine, namespace).await?;
        }
    }

    Ok(())
}

async fn scale(
    direction: Direction,
    accessor: KubeAccessor,
    config: &RunConfig,
) -> Result<(), Error> {
    let engine = ToggleEngine::new(accessor.clone());

    for namespace in &config.namespaces {
        if config.kinds.deployments {
            scale_kind::<Deployment>(&engine, direction, namespace).await?;
        }
        if config.kinds.stateful_sets {
            scale_kind::<StatefulSet>(&engine, direction, namespace).await?;
        }
        if config.kinds.daemon_sets {
            scale_kind::<DaemonSet>(&engine, direction, namespace).await?;
        }
    }

    let Some(timeout) = config.wait_timeout else {
        return Ok(());
    };

    let downscaled = direction == Direction::Down;
    let accessor = Arc::new(accessor);
    let mut wait = ReconciliationWait::default();

    for namespace in &config.namespaces {
        if config.kinds.deployments {
            watch_kind::<Deployment>(&mut wait, &accessor, namespace, downscaled).await?;
        }
        if config.kinds.stateful_sets {
            watch_kind::<StatefulSet>(&mut wait, &accessor, namespace, downscaled).await?;
        }
        if config.kinds.daemon_sets {
            watch_kind::<DaemonSet>(&mut wait, &accessor, namespace, downscaled).await?;
        }
    }

    tracing::info!(
        timeout = %humantime::format_duration(timeout),
        groups = wait.len(),
        "Waiting for workloads to reach their new state"
    );
    wait.run(timeout).await.context(WaitSnafu)?;
    tracing::info!("All workloads reached their new state");

    Ok(())
}

async fn scale_kind<W: Workload>(
    engine: &ToggleEngine<KubeAccessor>,
    direction: Direction,
    namespace: &str,
) -> Result<(), Error> {
    let workloads = list::<W>(engine.accessor(), namespace).await?;

    let changed = match direction {
        Direction::Down => engine.downscale(&workloads).await,
        Direction::Up => engine.upscale(&workloads).await,
    }
    .context(BatchSnafu { namespace })?;

    tracing::info!(
        kind = %W::KIND,
        namespace,
        changed,
        operation = %direction.operation(),
        "Changed workloads"
    );
    Ok(())
}

async fn restart_kind<W: Restartable>(
    engine: &ToggleEngine<KubeAccessor>,
    namespace: &str,
) -> Result<(), Error> {
    let workloads = list::<W>(engine.accessor(), namespace).await?;
    let changed = engine
        .restart(&workloads)
        .await
        .context(BatchSnafu { namespace })?;

    tracing::info!(
        kind = %W::KIND,
        namespace,
        changed,
        operation = %Operation::Restart,
        "Changed workloads"
    );
    Ok(())
}

async fn watch_kind<W: Workload>(
    wait: &mut ReconciliationWait,
    accessor: &Arc<KubeAccessor>,
    namespace: &str,
    downscaled: bool,
) -> Result<(), Error> {
    let workloads = list::<W>(accessor, namespace).await?;
    if !workloads.is_empty() {
        wait.watch(accessor.clone(), namespace, &workloads, downscaled);
    }

    Ok(())
}

async fn list<W: Workload>(accessor: &KubeAccessor, namespace: &str) -> Result<Vec<W>, Error> {
    let workloads = WorkloadAccessor::<W>::list(accessor, namespace)
        .await
        .context(ListSnafu {
            kind: W::KIND,
            namespace,
        })?;

    tracing::info!(kind = %W::KIND, namespace, found = workloads.len(), "Listed workloads");
    Ok(workloads)
}
