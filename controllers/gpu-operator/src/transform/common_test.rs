//! Unit tests for the shared transform rules

#[cfg(test)]
mod tests {
    use crate::component::Component;
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use crate::transform::common::*;
    use crate::transform::transform;
    use cluster_client::ClusterObject;
    use crds::{ComponentSpec, ContainerRuntime, EnvVarSpec, TolerationSpec};
    use k8s_openapi::api::core::v1::EnvVar;

    const PREREQUISITES: &str = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: nvidia-operator-validator
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: nvidia-operator-validator
subjects:
  - kind: ServiceAccount
    name: nvidia-operator-validator
    namespace: placeholder
"#;

    #[test]
    fn test_resolve_image_prefers_policy_coordinates() {
        let spec = component_spec("nvcr.io/nvidia", "k8s-device-plugin", "v0.14.5");
        let image = resolve_image(Component::DevicePlugin, &spec, Some("quay.io/other/plugin:v1"), None).unwrap();
        assert_eq!(image, "nvcr.io/nvidia/k8s-device-plugin:v0.14.5");
    }

    #[test]
    fn test_resolve_image_fallback_gets_suffix() {
        let spec = ComponentSpec::default();
        let image = resolve_image(Component::Driver, &spec, Some("nvcr.io/nvidia/driver:550.54.15"), Some("ubuntu22.04"));
        assert_eq!(image.unwrap(), "nvcr.io/nvidia/driver:550.54.15-ubuntu22.04");

        let digest = resolve_image(Component::Driver, &spec, Some("nvcr.io/nvidia/driver@sha256:abc"), Some("ubuntu22.04"));
        assert_eq!(digest.unwrap(), "nvcr.io/nvidia/driver@sha256:abc");

        let untagged = resolve_image(Component::Driver, &spec, Some("localhost:5000/driver"), Some("ubuntu22.04"));
        assert_eq!(untagged.unwrap(), "localhost:5000/driver");
    }

    #[test]
    fn test_resolve_image_errors() {
        let missing = resolve_image(Component::Dcgm, &ComponentSpec::default(), None, None).unwrap_err();
        assert!(matches!(missing, ControllerError::InvalidConfig(msg) if msg.contains("state-dcgm")));

        let partial = ComponentSpec {
            repository: Some("nvcr.io/nvidia".to_string()),
            version: Some("v1".to_string()),
            ..Default::default()
        };
        let err = resolve_image(Component::Dcgm, &partial, Some("nvcr.io/nvidia/dcgm:3"), None).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)), "partial coordinates never fall back");
    }

    #[test]
    fn test_upsert_env_replaces_in_place() {
        let mut env = vec![
            EnvVar {
                name: "A".to_string(),
                value: Some("1".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "B".to_string(),
                value: Some("2".to_string()),
                ..Default::default()
            },
        ];
        upsert_env(&mut env, "A", "3");
        upsert_env(&mut env, "C", "4");
        let pairs: Vec<_> = env.iter().map(|e| (e.name.as_str(), e.value.as_deref().unwrap())).collect();
        assert_eq!(pairs, vec![("A", "3"), ("B", "2"), ("C", "4")]);
    }

    #[test]
    fn test_binding_subjects_follow_operator_namespace() {
        let spec = policy_spec();
        let facts = ubuntu_facts();
        let config = operator_config();
        let owner = owner_ref();
        let ctx = transform_context(&spec, &facts, &config, Some(&owner));

        let object = apply_common(Component::PreRequisites, &template(PREREQUISITES), &ctx, None).unwrap();
        let ClusterObject::ClusterRoleBinding(crb) = &object else {
            panic!("expected a ClusterRoleBinding");
        };
        assert_eq!(crb.subjects.as_ref().unwrap()[0].namespace.as_deref(), Some(TEST_NAMESPACE));
        assert_eq!(object.namespace(), None, "cluster-scoped objects stay without namespace");
        assert!(object.meta().owner_references.is_some());
    }

    #[test]
    fn test_namespace_gets_no_owner_reference() {
        let spec = policy_spec();
        let facts = ubuntu_facts();
        let config = operator_config();
        let owner = owner_ref();
        let ctx = transform_context(&spec, &facts, &config, Some(&owner));

        let yaml = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: gpu-operator\n";
        let object = apply_common(Component::PreRequisites, &template(yaml), &ctx, None).unwrap();
        assert!(object.meta().owner_references.is_none());
    }

    #[test]
    fn test_runtime_class_uses_configured_name() {
        let mut spec = policy_spec();
        spec.operator.runtime_class = Some("nvidia-cdi".to_string());
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let yaml = "apiVersion: node.k8s.io/v1\nkind: RuntimeClass\nmetadata:\n  name: nvidia\nhandler: nvidia\n";
        let object = apply_common(Component::PreRequisites, &template(yaml), &ctx, None).unwrap();
        let ClusterObject::RuntimeClass(rc) = &object else {
            panic!("expected a RuntimeClass");
        };
        assert_eq!(rc.metadata.name.as_deref(), Some("nvidia-cdi"));
        assert_eq!(rc.handler, "nvidia-cdi");
    }

    #[test]
    fn test_component_settings_reach_main_container() {
        let mut spec = policy_spec();
        spec.device_plugin.common.image_pull_policy = Some("Always".to_string());
        spec.device_plugin.common.image_pull_secrets = vec!["ngc-secret".to_string(), "ngc-secret".to_string()];
        spec.device_plugin.common.args = vec!["--fail-on-init-error=false".to_string()];
        spec.device_plugin.common.env = vec![EnvVarSpec::new("PASS_DEVICE_SPECS", "true")];
        spec.device_plugin.common.tolerations = Some(vec![TolerationSpec {
            key: Some("nvidia.com/gpu".to_string()),
            operator: Some("Exists".to_string()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        }]);
        spec.daemonsets.priority_class_name = Some("system-node-critical".to_string());
        spec.daemonsets.labels.insert("team".to_string(), "gpu".to_string());
        spec.daemonsets.labels.insert("app".to_string(), "overridden".to_string());
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let yaml = simple_daemonset("nvidia-device-plugin-daemonset");
        let object = transform(Component::DevicePlugin, &template(&yaml), &ctx).unwrap().remove(0);
        let main = container(&object, "nvidia-device-plugin-daemonset-ctr");
        assert_eq!(main.image.as_deref(), Some("nvcr.io/nvidia/k8s-device-plugin:v0.14.5"));
        assert_eq!(main.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(main.args.as_ref().unwrap(), &vec!["--fail-on-init-error=false".to_string()]);
        assert_eq!(env_value(main, "PASS_DEVICE_SPECS"), Some("true"));

        let pod = pod_of(&object);
        assert_eq!(pod.image_pull_secrets.as_ref().unwrap().len(), 1);
        assert_eq!(pod.priority_class_name.as_deref(), Some("system-node-critical"));
        assert_eq!(pod.tolerations.as_ref().unwrap()[0].key.as_deref(), Some("nvidia.com/gpu"));
        assert_eq!(pod.runtime_class_name.as_deref(), Some("nvidia"));

        let ClusterObject::DaemonSet(ds) = &object else {
            panic!("expected a DaemonSet");
        };
        let labels = ds.spec.as_ref().unwrap().template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(labels["team"], "gpu");
        assert_eq!(labels["app"], "nvidia-device-plugin-daemonset", "template labels win");
    }

    #[test]
    fn test_runtime_class_only_for_containerd() {
        let mut spec = policy_spec();
        spec.operator.default_runtime = ContainerRuntime::Crio;
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let yaml = simple_daemonset("gpu-feature-discovery");
        let object = transform(Component::GpuFeatureDiscovery, &template(&yaml), &ctx).unwrap().remove(0);
        assert_eq!(pod_of(&object).runtime_class_name, None);
    }

    #[test]
    fn test_invalid_affinity_is_config_error() {
        let mut spec = policy_spec();
        spec.gfd.common.affinity = Some(serde_json::json!({"nodeAffinity": "not-an-object"}));
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let yaml = simple_daemonset("gpu-feature-discovery");
        let err = transform(Component::GpuFeatureDiscovery, &template(&yaml), &ctx).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let spec = policy_spec();
        let facts = ubuntu_facts();
        let config = operator_config();
        let owner = owner_ref();
        let ctx = transform_context(&spec, &facts, &config, Some(&owner));

        let template = template(TOOLKIT_DAEMONSET);
        let first = transform(Component::ContainerToolkit, &template, &ctx).unwrap();
        let second = transform(Component::ContainerToolkit, &template, &ctx).unwrap();
        assert_eq!(first[0].to_value().unwrap(), second[0].to_value().unwrap());
    }
}
