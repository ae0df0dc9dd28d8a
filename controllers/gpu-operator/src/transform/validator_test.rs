//! Unit tests for the operator validator transform

#[cfg(test)]
mod tests {
    use crate::component::Component;
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use crate::transform::transform;
    use crds::{ContainerRuntime, EnvVarSpec};

    const VALIDATOR: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nvidia-operator-validator
  annotations:
    nvidia.com/gpu-operator.container-roles: "nvidia-operator-validator=main,driver-validation=driver-validation,toolkit-validation=toolkit-validation,cuda-validation=cuda-validation,plugin-validation=plugin-validation"
spec:
  selector:
    matchLabels:
      app: nvidia-operator-validator
  template:
    metadata:
      labels:
        app: nvidia-operator-validator
    spec:
      initContainers:
        - name: driver-validation
          image: validator
        - name: toolkit-validation
          image: validator
        - name: cuda-validation
          image: validator
        - name: plugin-validation
          image: validator
      containers:
        - name: nvidia-operator-validator
          image: validator
"#;

    #[test]
    fn test_validation_env_and_workload_settings() {
        let mut spec = policy_spec();
        spec.validator.driver.env = vec![EnvVarSpec::new("DISABLE_DEV_CHAR_SYMLINK_CREATION", "true")];
        spec.validator.plugin.env = vec![EnvVarSpec::new("WITH_WORKLOAD", "false")];
        spec.validator.common.image_pull_policy = Some("IfNotPresent".to_string());
        spec.validator.common.image_pull_secrets = vec!["ngc".to_string(), "mirror".to_string()];
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::OperatorValidation, &template(VALIDATOR), &ctx).unwrap().remove(0);
        assert_eq!(
            env_value(container(&ds, "driver-validation"), "DISABLE_DEV_CHAR_SYMLINK_CREATION"),
            Some("true")
        );
        assert_eq!(env_value(container(&ds, "toolkit-validation"), "WITH_WORKLOAD"), None);

        let plugin = container(&ds, "plugin-validation");
        assert_eq!(env_value(plugin, "WITH_WORKLOAD"), Some("false"));
        assert_eq!(
            env_value(plugin, "VALIDATOR_IMAGE"),
            Some("nvcr.io/nvidia/cloud-native/gpu-operator-validator:v23.9.2")
        );
        assert_eq!(env_value(plugin, "VALIDATOR_IMAGE_PULL_POLICY"), Some("IfNotPresent"));
        assert_eq!(env_value(plugin, "VALIDATOR_IMAGE_PULL_SECRETS"), Some("ngc,mirror"));
        assert_eq!(env_value(plugin, "VALIDATOR_RUNTIME_CLASS"), Some("nvidia"));
        assert_eq!(env_value(container(&ds, "cuda-validation"), "VALIDATOR_RUNTIME_CLASS"), Some("nvidia"));
        assert_eq!(plugin.image_pull_policy.as_deref(), Some("IfNotPresent"));
    }

    #[test]
    fn test_unset_workload_settings_are_omitted() {
        let mut spec = policy_spec();
        spec.operator.default_runtime = ContainerRuntime::Docker;
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let ds = transform(Component::OperatorValidation, &template(VALIDATOR), &ctx).unwrap().remove(0);
        let cuda = container(&ds, "cuda-validation");
        assert_eq!(env_value(cuda, "VALIDATOR_RUNTIME_CLASS"), None);
        assert_eq!(env_value(cuda, "VALIDATOR_IMAGE_PULL_POLICY"), None);
        assert_eq!(env_value(cuda, "VALIDATOR_IMAGE_PULL_SECRETS"), None);
        assert!(env_value(cuda, "VALIDATOR_IMAGE").is_some());
    }

    #[test]
    fn test_missing_validation_role_is_template_error() {
        let spec = policy_spec();
        let facts = ubuntu_facts();
        let config = operator_config();
        let ctx = transform_context(&spec, &facts, &config, None);

        let yaml = VALIDATOR.replace(",plugin-validation=plugin-validation", "");
        let err = transform(Component::OperatorValidation, &template(&yaml), &ctx).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidTemplate(msg) if msg.contains("plugin-validation")));
    }
}
