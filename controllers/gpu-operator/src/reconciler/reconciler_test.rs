//! Unit tests for ClusterPolicy reconciliation

#[cfg(test)]
mod tests {
    use crate::component::Component;
    use crate::metrics::Metrics;
    use crate::reconciler::*;
    use crate::state::State;
    use crate::templates::{parse_documents, FileTemplateLoader, TemplateLoader};
    use crate::test_utils::*;
    use cluster_client::mock::daemonset_status;
    use cluster_client::{ClusterStoreTrait, MockClusterStore};
    use crds::PolicyState;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    const PLUGIN: &str = "nvidia-device-plugin-daemonset";

    fn reconciler(store: &MockClusterStore) -> Reconciler {
        let states = vec![State::new(
            Component::DevicePlugin,
            parse_documents(&simple_daemonset(PLUGIN)).unwrap(),
        )
        .unwrap()];
        Reconciler::new(
            Arc::new(store.clone()) as Arc<dyn ClusterStoreTrait>,
            StateManager::new(states),
            operator_config(),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn patched_state(store: &MockClusterStore, name: &str) -> Option<String> {
        store
            .policy_status(name)
            .and_then(|status| status["state"].as_str().map(str::to_string))
    }

    #[tokio::test]
    async fn test_pass_writes_status_and_backs_off() {
        let store = MockClusterStore::new();
        store.add_object(gpu_node("gpu-a", "5.15.0-91-generic"));
        let reconciler = reconciler(&store);
        let policy = cluster_policy("cluster-policy", policy_spec());

        let action = reconciler.reconcile_policy(&policy).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        assert_eq!(patched_state(&store, "cluster-policy").as_deref(), Some("notReady"));
        assert!(reconciler.synced().load(Ordering::Relaxed));

        let daemonset = store.daemonset(TEST_NAMESPACE, PLUGIN).unwrap();
        let owners = daemonset.metadata.owner_references.unwrap();
        assert_eq!(owners[0].name, "cluster-policy");

        reconciler.reconcile_policy(&policy).await.unwrap();
        let action = reconciler.reconcile_policy(&policy).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));

        store.set_daemonset_status(TEST_NAMESPACE, PLUGIN, daemonset_status(1, 0));
        let action = reconciler.reconcile_policy(&policy).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
        assert_eq!(patched_state(&store, "cluster-policy").as_deref(), Some("ready"));

        let rendered = reconciler.metrics.render().unwrap();
        assert!(rendered.contains("gpu_operator_gpu_nodes 1"));
        assert!(rendered.contains(r#"gpu_operator_reconciliations_total{result="ready"} 1"#));
    }

    #[tokio::test]
    async fn test_second_policy_is_ignored() {
        let store = MockClusterStore::new();
        let reconciler = reconciler(&store);

        reconciler.reconcile_policy(&cluster_policy("cluster-policy", policy_spec())).await.unwrap();
        assert_eq!(reconciler.active_policy().as_deref(), Some("cluster-policy"));

        let action = reconciler.reconcile_policy(&cluster_policy("second-policy", policy_spec())).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(patched_state(&store, "second-policy").as_deref(), Some("ignored"));
        assert_eq!(reconciler.active_policy().as_deref(), Some("cluster-policy"));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_rewritten() {
        let store = MockClusterStore::new();
        let reconciler = reconciler(&store);
        let mut policy = cluster_policy("cluster-policy", policy_spec());

        reconciler.reconcile_policy(&policy).await.unwrap();
        let written: ClusterPolicyStatus =
            serde_json::from_value(store.policy_status("cluster-policy").unwrap()).unwrap();
        assert_eq!(written.state, PolicyState::Ready, "no GPU nodes, nothing to wait for");

        policy.status = Some(written);
        let marker = serde_json::json!({"state": "marker"});
        store.patch_cluster_policy_status("cluster-policy", marker.clone()).await.unwrap();
        reconciler.reconcile_policy(&policy).await.unwrap();
        assert_eq!(store.policy_status("cluster-policy"), Some(marker));
    }

    #[tokio::test]
    async fn test_probe_failure_is_reported() {
        let store = MockClusterStore::new();
        store.add_object(cluster_client::mock::node(
            "gpu-bad",
            &[(crate::probe::GPU_PRESENT_LABEL, "true")],
        ));
        let reconciler = reconciler(&store);

        let outcome = reconciler.run_pass(&policy_spec(), None, Some(1)).await;
        assert!(!outcome.ready);
        assert!(outcome.error.is_some());
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.state.as_deref(), Some("state-device-plugin"));
    }

    #[tokio::test]
    async fn test_shipped_assets_reconcile_in_order() {
        let store = MockClusterStore::new();
        store.add_object(gpu_node("gpu-a", "5.15.0-91-generic"));
        let loader = FileTemplateLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"));
        for component in Component::ALL {
            assert!(loader.load(component.state_name()).is_ok(), "{} must load", component.state_name());
        }
        let reconciler = Reconciler::new(
            Arc::new(store.clone()) as Arc<dyn ClusterStoreTrait>,
            StateManager::from_loader(Arc::new(loader)),
            operator_config(),
            Arc::new(Metrics::new().unwrap()),
        );
        let policy = cluster_policy("cluster-policy", policy_spec());

        let outcome = reconciler.run_pass(&policy.spec, None, Some(1)).await;
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert_eq!(outcome.state.as_deref(), Some("state-driver"));
        let driver = store.daemonset(TEST_NAMESPACE, "nvidia-driver-daemonset").unwrap();
        let pod = driver.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers.len(), 1, "RDMA sidecar dropped");
        assert_eq!(pod.containers[0].image.as_deref(), Some("nvcr.io/nvidia/driver:550.54.15-ubuntu22.04"));
        assert!(pod.init_containers.unwrap_or_default().is_empty());

        store.set_daemonset_status(TEST_NAMESPACE, "nvidia-driver-daemonset", daemonset_status(1, 0));
        let outcome = reconciler.run_pass(&policy.spec, None, Some(1)).await;
        assert_eq!(outcome.state.as_deref(), Some("state-container-toolkit"));
        let toolkit = store.daemonset(TEST_NAMESPACE, "nvidia-container-toolkit-daemonset").unwrap();
        let init = toolkit.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
        assert_eq!(
            init[0].image.as_deref(),
            Some("nvcr.io/nvidia/cloud-native/gpu-operator-validator:v23.9.2")
        );
    }
}
