//! Unit tests for workload readiness

#[cfg(test)]
mod tests {
    use crate::readiness::*;
    use cluster_client::mock::{daemonset_status, deployment_status, pod};
    use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};

    #[test]
    fn test_daemonset_ready() {
        let mut ds = DaemonSet::default();
        assert!(!daemonset_ready(&ds), "no status reported yet");

        ds.status = Some(daemonset_status(3, 1));
        assert!(!daemonset_ready(&ds));

        ds.status = Some(daemonset_status(3, 0));
        assert!(daemonset_ready(&ds));
    }

    #[test]
    fn test_deployment_ready_needs_running_pod() {
        let mut deployment = Deployment {
            status: Some(deployment_status(1, 0)),
            ..Default::default()
        };
        let pending = pod("gpu-operator", "validator-a", &[("app", "validator")], "Pending");
        let running = pod("gpu-operator", "validator-b", &[("app", "validator")], POD_RUNNING);

        assert!(!deployment_ready(&deployment, &[]));
        assert!(!deployment_ready(&deployment, std::slice::from_ref(&pending)));
        assert!(deployment_ready(&deployment, &[pending.clone(), running.clone()]));

        deployment.status = Some(deployment_status(1, 1));
        assert!(!deployment_ready(&deployment, &[running]));
    }
}
