//! Scale-state transforms shared by the replica-bearing kinds.

use std::collections::BTreeMap;

use jiff::Timestamp;
use k8s_openapi::{
    api::core::v1::PodTemplateSpec, apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::ResourceExt;
use snafu::OptionExt;

use crate::{
    constants::{
        CHANGE_CAUSE_ANNOTATION, REPLICAS_ANNOTATION, RESTART_CHANGE_CAUSE,
        RESTARTED_AT_ANNOTATION,
    },
    workload::{MalformedMarker, MalformedMarkerSnafu, Toggle},
};

/// Kubernetes defaults `spec.replicas` to this when it is not set.
const DEFAULT_REPLICAS: i32 = 1;

/// Access to the fields the replica-based transforms need.
pub(super) trait ReplicaScaled: ResourceExt {
    fn replicas(&self) -> Option<i32>;
    fn set_replicas(&mut self, replicas: i32);
    fn pod_template_mut(&mut self) -> &mut PodTemplateSpec;

    fn desired_replicas(&self) -> i32 {
        self.replicas().unwrap_or(DEFAULT_REPLICAS)
    }
}

pub(super) fn scale_down<W: ReplicaScaled>(workload: &mut W) -> Toggle {
    let replicas = workload.desired_replicas();
    let marked = workload.annotations().contains_key(REPLICAS_ANNOTATION);

    if marked && replicas == 0 {
        return Toggle::AlreadyApplied;
    }

    // A marker with replicas > 0 is left over from an interrupted toggle. The stored count
    // still is the one to restore, so only the replicas are zeroed again.
    if !marked {
        workload
            .annotations_mut()
            .insert(REPLICAS_ANNOTATION.to_owned(), replicas.to_string());
    }
    workload.set_replicas(0);

    Toggle::Applied
}

pub(super) fn scale_up<W: ReplicaScaled>(workload: &mut W) -> Result<Toggle, MalformedMarker> {
    let Some(marker) = workload.annotations().get(REPLICAS_ANNOTATION) else {
        return Ok(Toggle::AlreadyApplied);
    };
    let replicas = parse_marker(marker)?;

    workload.set_replicas(replicas);
    workload.annotations_mut().remove(REPLICAS_ANNOTATION);

    Ok(Toggle::Applied)
}

pub(super) fn mark_restarted<W: ReplicaScaled>(workload: &mut W, at: Timestamp) {
    let annotations = workload
        .pod_template_mut()
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .annotations
        .get_or_insert_with(BTreeMap::new);

    annotations.insert(
        RESTARTED_AT_ANNOTATION.to_owned(),
        at.strftime("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    annotations.insert(
        CHANGE_CAUSE_ANNOTATION.to_owned(),
        RESTART_CHANGE_CAUSE.to_owned(),
    );
}

fn parse_marker(value: &str) -> Result<i32, MalformedMarker> {
    value
        .parse::<i32>()
        .ok()
        .filter(|replicas| *replicas >= 0)
        .context(MalformedMarkerSnafu { value })
}
