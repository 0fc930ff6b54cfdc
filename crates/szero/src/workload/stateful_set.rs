use jiff::Timestamp;
use k8s_openapi::api::{apps::v1::StatefulSet, core::v1::PodTemplateSpec};

use crate::workload::{
    MalformedMarker, Restartable, Toggle, Workload, WorkloadKind, observed_latest_generation,
    replicas::{self, ReplicaScaled},
};

impl ReplicaScaled for StatefulSet {
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

impl Workload for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;

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
            status.replicas == 0 && status.ready_replicas.unwrap_or_default() == 0
        } else {
            status.available_replicas.unwrap_or_default() == self.desired_replicas()
        }
    }
}

impl Restartable for StatefulSet {
    fn mark_restarted(&mut self, at: Timestamp) {
        replicas::mark_restarted(self, at);
    }
}
