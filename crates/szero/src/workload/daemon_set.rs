use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::DaemonSet;

use crate::{
    constants::{NO_SCHEDULE_NODE_SELECTOR, NO_SCHEDULE_NODE_SELECTOR_VALUE},
    workload::{MalformedMarker, Toggle, Workload, WorkloadKind, observed_latest_generation},
};

impl Workload for DaemonSet {
    const KIND: WorkloadKind = WorkloadKind::DaemonSet;

    fn toggle_down(&mut self) -> Toggle {
        if is_unschedulable(self) {
            return Toggle::AlreadyApplied;
        }

        self.spec
            .get_or_insert_with(Default::default)
            .template
            .spec
            .get_or_insert_with(Default::default)
            .node_selector
            .get_or_insert_with(BTreeMap::new)
            .insert(
                NO_SCHEDULE_NODE_SELECTOR.to_owned(),
                NO_SCHEDULE_NODE_SELECTOR_VALUE.to_owned(),
            );

        Toggle::Applied
    }

    fn toggle_up(&mut self) -> Result<Toggle, MalformedMarker> {
        let removed = self
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|pod_spec| pod_spec.node_selector.as_mut())
            .and_then(|node_selector| node_selector.remove(NO_SCHEDULE_NODE_SELECTOR));

        Ok(match removed {
            Some(_) => Toggle::Applied,
            None => Toggle::AlreadyApplied,
        })
    }

    fn is_reconciled(&self, downscaled: bool) -> bool {
        let Some(status) = self.status.as_ref() else {
            return observed_latest_generation(self, None);
        };
        if !observed_latest_generation(self, status.observed_generation) {
            return false;
        }

        if downscaled {
            status.number_ready == 0 && status.number_misscheduled == 0
        } else {
            status.number_ready == status.desired_number_scheduled
        }
    }
}

fn is_unschedulable(daemon_set: &DaemonSet) -> bool {
    daemon_set
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod_spec| pod_spec.node_selector.as_ref())
        .is_some_and(|node_selector| node_selector.contains_key(NO_SCHEDULE_NODE_SELECTOR))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::{
        apps::v1::{DaemonSetSpec, DaemonSetStatus},
        core::v1::{PodSpec, PodTemplateSpec},
    };
    use rstest::rstest;

    use super::*;

    fn daemon_set(node_selector: Option<BTreeMap<String, String>>) -> DaemonSet {
        DaemonSet {
            spec: Some(DaemonSetSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        node_selector,
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..DaemonSetSpec::default()
            }),
            ..DaemonSet::default()
        }
    }

    fn node_selector(daemon_set: &DaemonSet) -> BTreeMap<String, String> {
        daemon_set
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod_spec| pod_spec.node_selector.clone())
            .unwrap_or_default()
    }

    #[test]
    fn toggle_down_adds_sentinel() {
        let mut agent = daemon_set(None);

        assert_eq!(agent.toggle_down(), Toggle::Applied);
        assert_eq!(
            node_selector(&agent),
            BTreeMap::from([("szero/noschedule".to_owned(), "true".to_owned())])
        );

        let before = agent.clone();
        assert_eq!(agent.toggle_down(), Toggle::AlreadyApplied);
        assert_eq!(agent, before);
    }

    #[test]
    fn toggle_down_keeps_existing_selectors() {
        let mut agent = daemon_set(Some(BTreeMap::from([(
            "kubernetes.io/os".to_owned(),
            "linux".to_owned(),
        )])));

        assert_eq!(agent.toggle_down(), Toggle::Applied);
        assert_eq!(node_selector(&agent).len(), 2);

        assert_eq!(agent.toggle_up(), Ok(Toggle::Applied));
        assert_eq!(
            node_selector(&agent),
            BTreeMap::from([("kubernetes.io/os".to_owned(), "linux".to_owned())])
        );
    }

    #[test]
    fn toggle_up_without_sentinel_is_noop() {
        let mut agent = DaemonSet::default();

        assert_eq!(agent.toggle_up(), Ok(Toggle::AlreadyApplied));
        assert_eq!(agent, DaemonSet::default());
    }

    #[rstest]
    #[case::drained(true, 0, 0, 0, true)]
    #[case::pods_ready(true, 2, 0, 0, false)]
    #[case::misscheduled(true, 0, 1, 0, false)]
    #[case::all_ready(false, 3, 0, 3, true)]
    #[case::starting(false, 1, 0, 3, false)]
    fn reconciled(
        #[case] downscaled: bool,
        #[case] number_ready: i32,
        #[case] number_misscheduled: i32,
        #[case] desired_number_scheduled: i32,
        #[case] expected: bool,
    ) {
        let agent = DaemonSet {
            status: Some(DaemonSetStatus {
                number_ready,
                number_misscheduled,
                desired_number_scheduled,
                ..DaemonSetStatus::default()
            }),
            ..DaemonSet::default()
        };

        assert_eq!(agent.is_reconciled(downscaled), expected);
    }

    #[test]
    fn status_of_previous_generation_is_not_trusted() {
        // Right after the sentinel is removed, the status still describes the drained DaemonSet.
        let mut agent = DaemonSet {
            status: Some(DaemonSetStatus {
                observed_generation: Some(2),
                ..DaemonSetStatus::default()
            }),
            ..DaemonSet::default()
        };
        agent.metadata.generation = Some(3);

        assert!(!agent.is_reconciled(false));

        agent.status = Some(DaemonSetStatus {
            observed_generation: Some(3),
            desired_number_scheduled: 2,
            number_ready: 2,
            ..DaemonSetStatus::default()
        });
        assert!(agent.is_reconciled(false));
    }
}
