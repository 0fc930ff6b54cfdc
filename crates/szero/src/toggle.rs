//! Drives downscale, upscale and restart over a batch of workloads of one kind.
//!
//! Every workload is handled on its own: it is read fresh from the API, transformed in memory and
//! written back. Writes that lose against a concurrent writer are retried with a new read, so the
//! transform is always applied to the latest version of the object. A failing workload does not
//! stop the batch, its error is collected and reported together with the number of workloads that
//! were changed successfully.

use std::{error::Error as StdError, fmt, time::Duration};

use itertools::Itertools;
use jiff::Timestamp;
use kube::ResourceExt;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    client::{self, WorkloadAccessor},
    workload::{self, Restartable, Toggle, Workload, WorkloadKind},
};

/// Identifies a single workload in log output and errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{kind} {namespace}/{name}",
            kind = self.kind,
            namespace = self.namespace,
            name = self.name
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Downscale,
    Upscale,
    Restart,
}

impl Operation {
    fn applied_message(self) -> &'static str {
        match self {
            Self::Downscale => "Scaled down workload",
            Self::Upscale => "Scaled up workload",
            Self::Restart => "Restarted workload",
        }
    }

    fn skipped_message(self) -> &'static str {
        match self {
            Self::Downscale => "Workload is already scaled down",
            Self::Upscale => "Workload is not marked as scaled down",
            Self::Restart => "Workload needs no restart",
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ItemError {
    #[snafu(display("{kind} {name:?} has no namespace"))]
    MissingNamespace { kind: WorkloadKind, name: String },

    #[snafu(display("failed to read {workload}"))]
    Read {
        source: client::Error,
        workload: WorkloadRef,
    },

    #[snafu(display("{workload} carries a malformed replica count annotation"))]
    MalformedMarker {
        source: workload::MalformedMarker,
        workload: WorkloadRef,
    },

    #[snafu(display("gave up updating {workload} after {attempts} conflicting attempts"))]
    ConflictRetriesExhausted {
        source: client::Error,
        workload: WorkloadRef,
        attempts: u32,
    },

    #[snafu(display("failed to update {workload}"))]
    Write {
        source: client::Error,
        workload: WorkloadRef,
    },
}

/// Returned when at least one workload of a batch failed.
///
/// The workloads that were changed before and after the failure stay changed, their count is
/// available through [`BatchError::succeeded`].
#[derive(Debug, Snafu)]
#[snafu(display(
    "failed to {operation} {failed} {kind}(s), {succeeded} succeeded:{details}",
    failed = failures.len(),
    details = failures.iter().map(|failure| format!("\n  - {}", error_chain(failure))).join(""),
))]
pub struct BatchError {
    operation: Operation,
    kind: WorkloadKind,
    succeeded: usize,
    failures: Vec<ItemError>,
}

impl BatchError {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failures(&self) -> &[ItemError] {
        &self.failures
    }
}

/// Bounds the optimistic-concurrency retry loop around each write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of write attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following the (1-based) `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));

        self.initial_backoff.saturating_mul(factor)
    }
}

pub struct ToggleEngine<A> {
    accessor: A,
    retry_policy: RetryPolicy,
}

impl<A> ToggleEngine<A> {
    pub fn new(accessor: A) -> Self {
        Self {
            accessor,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// Scales the `workloads` to zero, returning how many of them were changed.
    pub async fn downscale<W>(&self, workloads: &[W]) -> Result<usize, BatchError>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
    {
        self.run(Operation::Downscale, workloads, |workload| {
            Ok(workload.toggle_down())
        })
        .await
    }

    /// Scales previously downscaled `workloads` back up, returning how many of them were changed.
    pub async fn upscale<W>(&self, workloads: &[W]) -> Result<usize, BatchError>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
    {
        self.run(Operation::Upscale, workloads, W::toggle_up).await
    }

    /// Triggers a rollout of all `workloads`.
    pub async fn restart<W>(&self, workloads: &[W]) -> Result<usize, BatchError>
    where
        W: Restartable,
        A: WorkloadAccessor<W>,
    {
        self.run(Operation::Restart, workloads, |workload| {
            workload.mark_restarted(Timestamp::now());
            Ok(Toggle::Applied)
        })
        .await
    }

    async fn run<W, F>(
        &self,
        operation: Operation,
        workloads: &[W],
        transform: F,
    ) -> Result<usize, BatchError>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
        F: Fn(&mut W) -> Result<Toggle, workload::MalformedMarker>,
    {
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for workload in workloads {
            match self.apply(operation, workload, &transform).await {
                Ok(Toggle::Applied) => succeeded += 1,
                Ok(Toggle::AlreadyApplied) => {}
                Err(error) => {
                    tracing::warn!(
                        error = &error as &dyn StdError,
                        %operation,
                        "Failed to change workload"
                    );
                    failures.push(error);
                }
            }
        }

        if failures.is_empty() {
            Ok(succeeded)
        } else {
            BatchSnafu {
                operation,
                kind: W::KIND,
                succeeded,
                failures,
            }
            .fail()
        }
    }

    async fn apply<W, F>(
        &self,
        operation: Operation,
        listed: &W,
        transform: &F,
    ) -> Result<Toggle, ItemError>
    where
        W: Workload,
        A: WorkloadAccessor<W>,
        F: Fn(&mut W) -> Result<Toggle, workload::MalformedMarker>,
    {
        let name = listed.name_any();
        let namespace = listed.namespace().context(MissingNamespaceSnafu {
            kind: W::KIND,
            name: &name,
        })?;
        let target = WorkloadRef {
            kind: W::KIND,
            namespace,
            name,
        };

        let mut attempt = 1;
        loop {
            let mut workload = self
                .accessor
                .get(&target.namespace, &target.name)
                .await
                .context(ReadSnafu {
                    workload: target.clone(),
                })?;

            let toggle = transform(&mut workload).context(MalformedMarkerSnafu {
                workload: target.clone(),
            })?;
            if !toggle.is_applied() {
                tracing::info!(
                    kind = %target.kind,
                    namespace = target.namespace,
                    name = target.name,
                    "{}",
                    operation.skipped_message()
                );
                return Ok(Toggle::AlreadyApplied);
            }

            match self.accessor.update(&target.namespace, &workload).await {
                Ok(_) => {
                    tracing::info!(
                        kind = %target.kind,
                        namespace = target.namespace,
                        name = target.name,
                        "{}",
                        operation.applied_message()
                    );
                    return Ok(Toggle::Applied);
                }
                Err(error) if error.is_conflict() && attempt < self.retry_policy.max_attempts => {
                    let backoff = self.retry_policy.backoff(attempt);
                    tracing::debug!(
                        kind = %target.kind,
                        namespace = target.namespace,
                        name = target.name,
                        attempt,
                        ?backoff,
                        "Workload was modified concurrently, retrying with a fresh copy"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) if error.is_conflict() => {
                    return Err(error).context(ConflictRetriesExhaustedSnafu {
                        workload: target,
                        attempts: attempt,
                    });
                }
                Err(error) => return Err(error).context(WriteSnafu { workload: target }),
            }
        }
    }
}

/// Renders an error together with all of its causes on one line.
fn error_chain(error: &dyn StdError) -> String {
    std::iter::successors(Some(error), |&error| error.source()).join(": ")
}
