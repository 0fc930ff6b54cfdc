//! Scales Kubernetes workloads to zero and back.
//!
//! Deployments and StatefulSets are scaled down to zero replicas, the previous replica count is
//! kept in an annotation on the object itself. DaemonSets are deactivated with a node selector no
//! node matches. Both markers are reverted on upscale, so a toggle can be repeated any number of
//! times without additional state.
//!
//! - [`workload`] holds the per-kind transforms and readiness checks.
//! - [`toggle`] applies a transform to a batch of workloads with optimistic-concurrency retries.
//! - [`wait`] blocks until toggled workloads have reached their new state.
//! - [`client`] abstracts the Kubernetes API.

pub mod client;
pub mod constants;
pub mod toggle;
pub mod wait;
pub mod workload;

// External re-exports
pub use k8s_openapi;
pub use kube;
