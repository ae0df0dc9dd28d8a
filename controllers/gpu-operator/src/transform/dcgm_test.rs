//! Unit tests for the DCGM transforms

#[cfg(test)]
mod tests {
    use crate::component::Component;
    use crate::test_utils::*;
    use crate::transform::transform;
    use crds::ConfigMapReference;
    use k8s_openapi::api::core::v1::Container;

    const EXPORTER: &str = "nvidia-dcgm-exporter";

    fn exporter_main(ds: &cluster_client::ClusterObject) -> &Container {
        container(ds, "nvidia-dcgm-exporter-ctr")
    }

    #[test]
    fn test_host_engine_port() {
        let mut spec = policy_spec();
        spec.dcgm.enabled = Some(true);
        spec.dcgm.host_port = Some(5556);
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::Dcgm, &template(&simple_daemonset("nvidia-dcgm")), &ctx).unwrap().remove(0);
        let port = &container(&ds, "nvidia-dcgm-ctr").ports.as_ref().unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("dcgm"));
        assert_eq!(port.container_port, 5556);
        assert_eq!(port.host_port, Some(5556));
    }

    #[test]
    fn test_exporter_targets_standalone_host_engine() {
        let mut spec = policy_spec();
        spec.dcgm.enabled = Some(true);
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::DcgmExporter, &template(&simple_daemonset(EXPORTER)), &ctx).unwrap().remove(0);
        let main = exporter_main(&ds);
        assert_eq!(env_value(main, "DCGM_REMOTE_HOSTENGINE_INFO"), Some("$(NODE_IP):5555"));
        let node_ip = main.env.iter().flatten().find(|e| e.name == "NODE_IP").unwrap();
        let field = node_ip.value_from.as_ref().unwrap().field_ref.as_ref().unwrap();
        assert_eq!(field.field_path, "status.hostIP");
        // NODE_IP must precede the variable that expands it
        let names: Vec<_> = main.env.iter().flatten().map(|e| e.name.as_str()).collect();
        let ip_index = names.iter().position(|n| *n == "NODE_IP").unwrap();
        let info_index = names.iter().position(|n| *n == "DCGM_REMOTE_HOSTENGINE_INFO").unwrap();
        assert!(ip_index < info_index);
    }

    #[test]
    fn test_exporter_embedded_engine_and_metrics_config() {
        let mut spec = policy_spec();
        spec.dcgm_exporter.config = Some(ConfigMapReference {
            name: "custom-metrics".to_string(),
        });
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::DcgmExporter, &template(&simple_daemonset(EXPORTER)), &ctx).unwrap().remove(0);
        let main = exporter_main(&ds);
        assert_eq!(env_value(main, "DCGM_REMOTE_HOSTENGINE_INFO"), None);
        assert_eq!(
            env_value(main, "DCGM_EXPORTER_COLLECTORS"),
            Some("/etc/dcgm-exporter/dcgm-metrics.csv")
        );
        let mount = main.volume_mounts.iter().flatten().find(|m| m.name == "metrics-config").unwrap();
        assert_eq!(mount.sub_path.as_deref(), Some("dcgm-metrics.csv"));
        let volume = pod_of(&ds).volumes.iter().flatten().find(|v| v.name == "metrics-config").unwrap();
        assert_eq!(volume.config_map.as_ref().unwrap().name, "custom-metrics");
    }

    #[test]
    fn test_openshift_adds_relabel_init_container() {
        let spec = policy_spec();
        let mut facts = ubuntu_facts();
        facts.openshift = true;
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::DcgmExporter, &template(&simple_daemonset(EXPORTER)), &ctx).unwrap().remove(0);
        let init = container(&ds, "init-pod-nvidia-metrics-exporter");
        assert_eq!(init.image, exporter_main(&ds).image);
        assert_eq!(init.security_context.as_ref().unwrap().privileged, Some(true));
        assert!(pod_of(&ds).volumes.iter().flatten().any(|v| v.name == "pod-gpu-resources"));
    }
}
