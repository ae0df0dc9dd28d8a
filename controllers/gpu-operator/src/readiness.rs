//! Readiness of written workloads, judged from their observed status.

use cluster_client::ClusterObject;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};

/// Phase of a running pod
pub const POD_RUNNING: &str = "Running";

/// A DaemonSet is ready once it reports status with no unavailable pod
pub fn daemonset_ready(daemonset: &DaemonSet) -> bool {
    match daemonset.status.as_ref() {
        Some(status) => status.number_unavailable.unwrap_or(0) == 0,
        None => false,
    }
}

/// A Deployment is ready when no replica is unavailable and one of its pods runs
pub fn deployment_ready(deployment: &Deployment, pods: &[ClusterObject]) -> bool {
    let available = deployment
        .status
        .as_ref()
        .is_some_and(|status| status.unavailable_replicas.unwrap_or(0) == 0);
    available && pods.iter().any(pod_running)
}

fn pod_running(object: &ClusterObject) -> bool {
    match object {
        ClusterObject::Pod(pod) => pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some(POD_RUNNING),
        _ => false,
    }
}
