//! Annotation and label keys szero reads and writes on workloads.

/// Stores the replica count a Deployment or StatefulSet had before it was scaled down.
///
/// The presence of this annotation is what marks the workload as downscaled.
pub const REPLICAS_ANNOTATION: &str = "szero/replicas";

/// Node selector key added to the pod template of a deactivated DaemonSet.
///
/// No node carries this label, so the DaemonSet controller removes all pods.
pub const NO_SCHEDULE_NODE_SELECTOR: &str = "szero/noschedule";
pub const NO_SCHEDULE_NODE_SELECTOR_VALUE: &str = "true";

pub const RESTARTED_AT_ANNOTATION: &str = "kubernetes.io/restartedAt";
pub const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";
pub const RESTART_CHANGE_CAUSE: &str = "Restarted by szero";
