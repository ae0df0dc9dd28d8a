//! Unit tests for templates module

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::templates::*;
    use cluster_client::ObjectKind;
    use std::fs;

    const DRIVER_DS: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nvidia-driver-daemonset
  annotations:
    nvidia.com/gpu-operator.container-roles: "nvidia-driver-ctr=main,nvidia-peermem-ctr=rdma-sidecar,mofed-validation=rdma-validation"
spec:
  selector:
    matchLabels:
      app: nvidia-driver-daemonset
  template:
    metadata:
      labels:
        app: nvidia-driver-daemonset
    spec:
      initContainers:
        - name: mofed-validation
          image: validator
      containers:
        - name: nvidia-driver-ctr
          image: driver
        - name: nvidia-peermem-ctr
          image: driver
"#;

    #[test]
    fn test_roles_annotation_is_parsed_and_stripped() {
        let templates = parse_documents(DRIVER_DS).unwrap();
        assert_eq!(templates.len(), 1);
        let template = &templates[0];
        assert_eq!(template.kind(), ObjectKind::DaemonSet);
        assert_eq!(template.roles.role_of("nvidia-driver-ctr"), Some(ContainerRole::Main));
        assert_eq!(template.roles.role_of("nvidia-peermem-ctr"), Some(ContainerRole::RdmaSidecar));
        assert_eq!(template.roles.role_of("mofed-validation"), Some(ContainerRole::RdmaValidation));
        assert!(template.object.meta().annotations.is_none(), "annotation must not reach the cluster");
    }

    #[test]
    fn test_first_container_is_main_without_annotation() {
        let text = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nvidia-device-plugin-daemonset
spec:
  selector:
    matchLabels:
      app: nvidia-device-plugin-daemonset
  template:
    spec:
      containers:
        - name: nvidia-device-plugin
        - name: config-manager
"#;
        let template = parse_documents(text).unwrap().remove(0);
        assert_eq!(template.roles.role_of("nvidia-device-plugin"), Some(ContainerRole::Main));
        assert_eq!(template.roles.role_of("config-manager"), None);
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let err = ContainerRoles::parse("ctr=sidekick").unwrap_err();
        assert!(matches!(err, ControllerError::InvalidTemplate(_)));
        assert!("sidekick".parse::<ContainerRole>().is_err());
    }

    #[test]
    fn test_multi_document_and_empty_documents() {
        let text = r#"
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: nvidia-driver
---
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: nvidia-driver
rules: []
"#;
        let templates = parse_documents(text).unwrap();
        let kinds: Vec<_> = templates.iter().map(|t| t.kind()).collect();
        assert_eq!(kinds, vec![ObjectKind::ServiceAccount, ObjectKind::Role]);
    }

    #[test]
    fn test_pods_are_not_templates() {
        let text = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n";
        assert!(matches!(parse_documents(text), Err(ControllerError::InvalidTemplate(_))));
    }

    #[test]
    fn test_file_loader_reads_in_lexical_order() {
        let root = tempfile::tempdir().unwrap();
        let state = root.path().join("state-driver");
        fs::create_dir_all(&state).unwrap();
        fs::write(state.join("0500_daemonset.yaml"), DRIVER_DS).unwrap();
        fs::write(
            state.join("0100_service_account.yml"),
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: nvidia-driver\n",
        )
        .unwrap();
        fs::write(state.join("README.md"), "not a manifest").unwrap();

        let loader = FileTemplateLoader::new(root.path());
        let templates = loader.load("state-driver").unwrap();
        let names: Vec<_> = templates.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["nvidia-driver", "nvidia-driver-daemonset"]);
    }

    #[test]
    fn test_file_loader_missing_state_is_load_error() {
        let root = tempfile::tempdir().unwrap();
        let loader = FileTemplateLoader::new(root.path());
        assert!(matches!(loader.load("state-mig-manager"), Err(ControllerError::TemplateLoad(_))));
    }
}
