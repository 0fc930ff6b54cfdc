use jiff::Timestamp;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::PodTemplateSpec};

use crate::workload::{
    MalformedMarker, Restartable, Toggle, Workload, WorkloadKind, observed_latest_generation,
    replicas::{self, ReplicaScaled},
};

impl ReplicaScaled for Deployment {
    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|spec| spec.replicas)
    }

    fn set_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    fn pod_template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut self.spec.get_or_insert_with(Default::default).template
    }
}

impl Workload for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;

    fn toggle_down(&mut self) -> Toggle {
        replicas::scale_down(self)
    }

    fn toggle_up(&mut self) -> Result<Toggle, MalformedMarker> {
        replicas::scale_up(self)
    }

    fn is_reconciled(&self, downscaled: bool) -> bool {
        let Some(status) = self.status.as_ref() else {
            return observed_latest_generation(self, None)
                && (downscaled || self.desired_replicas() == 0);
        };
        if !observed_latest_generation(self, status.observed_generation) {
            return false;
        }

        if downscaled {
            status.replicas.unwrap_or_default() == 0
                && status.ready_replicas.unwrap_or_default() == 0
        } else {
            status.available_replicas.unwrap_or_default() == self.desired_replicas()
        }
    }
}

impl Restartable for Deployment {
    fn mark_restarted(&mut self, at: Timestamp) {
        replicas::mark_restarted(self, at);
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{
        api::apps::v1::{DeploymentSpec, DeploymentStatus},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use rstest::rstest;

    use super::*;

    fn deployment(replicas: i32, status: DeploymentStatus) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            status: Some(status),
            ..Deployment::default()
        }
    }

    #[rstest]
    #[case::drained(0, Some(0), Some(0), true)]
    #[case::status_not_reported(0, None, None, true)]
    #[case::pods_left(0, Some(1), Some(0), false)]
    #[case::pods_ready(0, Some(0), Some(1), false)]
    fn reconciled_when_downscaled(
        #[case] spec_replicas: i32,
        #[case] replicas: Option<i32>,
        #[case] ready_replicas: Option<i32>,
        #[case] expected: bool,
    ) {
        let deployment = deployment(spec_replicas, DeploymentStatus {
            replicas,
            ready_replicas,
            ..DeploymentStatus::default()
        });

        assert_eq!(deployment.is_reconciled(true), expected);
    }

    #[rstest]
    #[case::all_available(3, Some(3), true)]
    #[case::rolling_out(3, Some(1), false)]
    #[case::nothing_available(3, None, false)]
    #[case::scaled_to_zero(0, None, true)]
    fn reconciled_when_upscaled(
        #[case] spec_replicas: i32,
        #[case] available_replicas: Option<i32>,
        #[case] expected: bool,
    ) {
        let deployment = deployment(spec_replicas, DeploymentStatus {
            available_replicas,
            ..DeploymentStatus::default()
        });

        assert_eq!(deployment.is_reconciled(false), expected);
    }

    #[rstest]
    #[case::not_yet_observed(Some(2), Some(1), false)]
    #[case::observed(Some(2), Some(2), true)]
    #[case::no_status_yet(Some(1), None, false)]
    #[case::untracked(None, None, true)]
    fn stale_status_is_not_trusted(
        #[case] generation: Option<i64>,
        #[case] observed_generation: Option<i64>,
        #[case] expected: bool,
    ) {
        let mut deployment = deployment(2, DeploymentStatus {
            observed_generation,
            available_replicas: Some(2),
            ..DeploymentStatus::default()
        });
        deployment.metadata = ObjectMeta {
            generation,
            ..ObjectMeta::default()
        };

        assert_eq!(deployment.is_reconciled(false), expected);
    }

    #[test]
    fn toggle_down_on_empty_object_creates_spec() {
        let mut deployment = Deployment::default();

        assert_eq!(deployment.toggle_down(), Toggle::Applied);
        assert_eq!(deployment.replicas(), Some(0));
    }
}
