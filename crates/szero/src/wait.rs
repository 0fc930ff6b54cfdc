//! Waits until toggled workloads have converged to their new state.
//!
//! Each registered group of workloads (one kind in one namespace) is polled by its own task. The
//! coordinator in [`ReconciliationWait::run`] collects completion signals and the first error from
//! these tasks and enforces a single deadline for all of them. Once it returns, every task still
//! polling is told to stop and is awaited, so no requests are sent after the wait is over.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    client::{self, WorkloadAccessor},
    toggle::WorkloadRef,
    workload::Workload,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {workload} while waiting for it to reconcile"))]
    Read {
        source: client::Error,
        workload: WorkloadRef,
    },

    #[snafu(display("workloads did not reconcile within {timeout:?}"))]
    Timeout { timeout: Duration },

    #[snafu(display("a wait task stopped without reporting its result"))]
    WorkerAborted,
}

pub struct ReconciliationWait {
    poll_interval: Duration,
    workers: Vec<BoxFuture<'static, Result<(), Error>>>,
    cancel_tx: watch::Sender<bool>,
}

impl Default for ReconciliationWait {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL)
    }
}

impl ReconciliationWait {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(poll_interval: Duration) -> Self {
        let (cancel_tx, _) = watch::channel(false);

        Self {
            poll_interval,
            workers: Vec::new(),
            cancel_tx,
        }
    }

    /// Registers a group of workloads of one kind in `namespace`.
    ///
    /// Nothing is polled before [`ReconciliationWait::run`] is called.
    pub fn watch<W, A>(
        &mut self,
        accessor: Arc<A>,
        namespace: &str,
        workloads: &[W],
        downscaled: bool,
    ) where
        W: Workload,
        A: WorkloadAccessor<W> + 'static,
    {
        let group = Group {
            accessor,
            namespace: namespace.to_owned(),
            names: workloads.iter().map(ResourceExt::name_any).collect(),
            downscaled,
        };
        let mut cancel_rx = self.cancel_tx.subscribe();
        let poll_interval = self.poll_interval;

        self.workers.push(Box::pin(async move {
            tokio::select! {
                _ = cancel_rx.changed() => Ok(()),
                result = group.poll::<W>(poll_interval) => result,
            }
        }));
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Blocks until all registered groups are reconciled, the first group fails, or `timeout`
    /// elapsed.
    pub async fn run(self, timeout: Duration) -> Result<(), Error> {
        let Self {
            workers, cancel_tx, ..
        } = self;

        let mut outstanding = workers.len();
        if outstanding == 0 {
            return Ok(());
        }

        let (done_tx, mut done_rx) = mpsc::channel::<()>(outstanding);
        let (error_tx, mut error_rx) = mpsc::channel::<Error>(1);

        let mut tasks = JoinSet::new();
        for worker in workers {
            let done_tx = done_tx.clone();
            let error_tx = error_tx.clone();

            tasks.spawn(async move {
                match worker.await {
                    Ok(()) => {
                        done_tx.send(()).await.ok();
                    }
                    // Only the first error is of interest, later ones are dropped.
                    Err(error) => {
                        error_tx.try_send(error).ok();
                    }
                }
            });
        }
        drop((done_tx, error_tx));

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let result = loop {
            tokio::select! {
                biased;

                Some(error) = error_rx.recv() => break Err(error),
                done = done_rx.recv() => match done {
                    Some(()) => {
                        outstanding -= 1;
                        if outstanding == 0 {
                            break Ok(());
                        }
                    }
                    None => break WorkerAbortedSnafu.fail(),
                },
                () = &mut deadline => break TimeoutSnafu { timeout }.fail(),
            }
        };

        cancel_tx.send_replace(true);
        tasks.shutdown().await;

        result
    }
}

/// Workloads of one kind in one namespace, polled by a single task.
struct Group<A> {
    accessor: Arc<A>,
    namespace: String,
    names: Vec<String>,
    downscaled: bool,
}

impl<A> Group<A> {
    async fn poll<W>(&self, poll_interval: Duration) -> Result<(), Error>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
    {
        // Right after a write the status may still describe the previous state, so the first
        // check waits for one interval.
        let mut interval = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if self.is_reconciled::<W>().await? {
                tracing::info!(
                    kind = %W::KIND,
                    namespace = self.namespace,
                    count = self.names.len(),
                    "Workloads reached the desired state"
                );
                return Ok(());
            }
        }
    }

    async fn is_reconciled<W>(&self) -> Result<bool, Error>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
    {
        for name in &self.names {
            let workload = self
                .accessor
                .get(&self.namespace, name)
                .await
                .with_context(|_| ReadSnafu {
                    workload: WorkloadRef {
                        kind: W::KIND,
                        namespace: self.namespace.clone(),
                        name: name.clone(),
                    },
                })?;

            if !workload.is_reconciled(self.downscaled) {
                tracing::debug!(
                    kind = %W::KIND,
                    namespace = self.namespace,
                    name,
                    "Waiting for workload to reach the desired state"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}
