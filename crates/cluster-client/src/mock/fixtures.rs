//! Builders for objects the operator only reads (nodes and pods) and for
//! the status the workload controllers would report

use crate::object::ClusterObject;
use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentStatus};
use k8s_openapi::api::core::v1::{Node, Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

/// A node carrying the given labels
pub fn node(name: &str, node_labels: &[(&str, &str)]) -> ClusterObject {
    ClusterObject::Node(Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labels(node_labels),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// A pod in `phase` (e.g., "Running", "Pending")
pub fn pod(namespace: &str, name: &str, pod_labels: &[(&str, &str)], phase: &str) -> ClusterObject {
    ClusterObject::Pod(Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: labels(pod_labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// DaemonSet status with `desired` scheduled pods of which `unavailable` are not ready
pub fn daemonset_status(desired: i32, unavailable: i32) -> DaemonSetStatus {
    DaemonSetStatus {
        desired_number_scheduled: desired,
        current_number_scheduled: desired,
        number_ready: desired - unavailable,
        number_available: Some(desired - unavailable),
        number_unavailable: Some(unavailable),
        number_misscheduled: 0,
        ..Default::default()
    }
}

/// Deployment status with `replicas` of which `unavailable` are not available
pub fn deployment_status(replicas: i32, unavailable: i32) -> DeploymentStatus {
    DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: Some(replicas - unavailable),
        available_replicas: Some(replicas - unavailable),
        unavailable_replicas: Some(unavailable),
        ..Default::default()
    }
}
