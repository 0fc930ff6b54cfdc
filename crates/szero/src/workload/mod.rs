//! The workload kinds szero knows how to toggle.
//!
//! Every kind implements [`Workload`], which bundles the scale-state transforms (how a kind is
//! marked as scaled down and how that marker is reverted) with the readiness predicate used while
//! waiting for the cluster to catch up. The transforms only touch the in-memory object, writing it
//! back is left to [`ToggleEngine`](crate::toggle::ToggleEngine).
//!
//! Deployments and StatefulSets are scaled down by recording their replica count in the
//! [`REPLICAS_ANNOTATION`](crate::constants::REPLICAS_ANNOTATION) and setting `spec.replicas` to
//! `0`. DaemonSets have no replica count, so they get a node selector no node can satisfy instead.

use std::fmt::Debug;

use jiff::Timestamp;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

mod daemon_set;
mod deployment;
mod replicas;
mod stateful_set;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

/// Outcome of a scale-state transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    /// The object was changed and needs to be written back.
    Applied,

    /// The object already was in the requested state and was left untouched.
    AlreadyApplied,
}

impl Toggle {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("stored replica count {value:?} is not a non-negative integer"))]
pub struct MalformedMarker {
    value: String,
}

impl MalformedMarker {
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A namespaced workload that can be scaled to zero and back.
pub trait Workload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: WorkloadKind;

    /// Deactivates the workload.
    ///
    /// Returns [`Toggle::AlreadyApplied`] without touching the object if it is already
    /// deactivated.
    fn toggle_down(&mut self) -> Toggle;

    /// Reactivates a workload previously deactivated by [`Workload::toggle_down`].
    fn toggle_up(&mut self) -> Result<Toggle, MalformedMarker>;

    /// Whether the observed status has converged to the scaled down (or scaled up) state.
    fn is_reconciled(&self, downscaled: bool) -> bool;
}

/// Whether the controller has seen the latest spec of `workload`, so that its status counters
/// describe that spec.
///
/// Objects without a generation, which the API server always sets, are taken as observed.
fn observed_latest_generation<W: Resource>(
    workload: &W,
    observed_generation: Option<i64>,
) -> bool {
    match (workload.meta().generation, observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// A workload whose pods can be rolled by changing the pod template.
pub trait Restartable: Workload {
    /// Stamps the pod template with the restart time, forcing a new rollout.
    ///
    /// Every call changes the template, there is no "already restarted" state.
    fn mark_restarted(&mut self, at: Timestamp);
}
