//! Test utilities for unit testing transforms, states and the reconciler
//!
//! This module provides helpers for creating policies, probed environments
//! and templates.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::probe::{EnvironmentFacts, NodeFact, GPU_PRESENT_LABEL, KERNEL_VERSION_LABEL, OS_ID_LABEL, OS_VERSION_LABEL};
use crate::templates::{parse_documents, ResourceTemplate, TemplateLoader};
use crate::transform::common::pod_spec;
use crate::transform::TransformContext;
use cluster_client::mock::node;
use cluster_client::ClusterObject;
use crds::{ClusterPolicy, ClusterPolicySpec, ComponentSpec, DriverSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Operand namespace used by every test
pub const TEST_NAMESPACE: &str = "gpu-operator";

/// Image coordinates `repository/image:version`
pub fn component_spec(repository: &str, image: &str, version: &str) -> ComponentSpec {
    ComponentSpec {
        repository: Some(repository.to_string()),
        image: Some(image.to_string()),
        version: Some(version.to_string()),
        ..Default::default()
    }
}

/// Driver spec with the given image coordinates
pub fn driver_spec(repository: &str, image: &str, version: &str) -> DriverSpec {
    DriverSpec {
        common: component_spec(repository, image, version),
        ..Default::default()
    }
}

/// Facts of a GPU node
pub fn node_fact(name: &str, kernel: &str, os_id: &str, os_version: &str) -> NodeFact {
    NodeFact {
        name: name.to_string(),
        gpu_present: true,
        kernel: kernel.to_string(),
        os_id: os_id.to_string(),
        os_version: os_version.to_string(),
    }
}

/// Environment with the given GPU nodes, not OpenShift, no proxy
pub fn facts(nodes: Vec<NodeFact>) -> EnvironmentFacts {
    EnvironmentFacts {
        nodes,
        ..Default::default()
    }
}

/// One Ubuntu 22.04 GPU node
pub fn ubuntu_facts() -> EnvironmentFacts {
    facts(vec![node_fact("gpu-a", "5.15.0-91-generic", "ubuntu", "22.04")])
}

/// Cluster node labelled the way discovery labels a GPU node
pub fn gpu_node(name: &str, kernel: &str) -> ClusterObject {
    node(
        name,
        &[
            (GPU_PRESENT_LABEL, "true"),
            (KERNEL_VERSION_LABEL, kernel),
            (OS_ID_LABEL, "ubuntu"),
            (OS_VERSION_LABEL, "22.04"),
        ],
    )
}

/// Policy with image coordinates for every operand
pub fn policy_spec() -> ClusterPolicySpec {
    let mut spec = ClusterPolicySpec::default();
    spec.driver = driver_spec("nvcr.io/nvidia", "driver", "550.54.15");
    spec.toolkit.common = component_spec("nvcr.io/nvidia/k8s", "container-toolkit", "v1.14.6");
    spec.validator.common = component_spec("nvcr.io/nvidia/cloud-native", "gpu-operator-validator", "v23.9.2");
    spec.device_plugin.common = component_spec("nvcr.io/nvidia", "k8s-device-plugin", "v0.14.5");
    spec.dcgm.common = component_spec("nvcr.io/nvidia/cloud-native", "dcgm", "3.3.0-1-ubuntu22.04");
    spec.dcgm_exporter.common = component_spec("nvcr.io/nvidia/k8s", "dcgm-exporter", "3.3.0-3.2.0-ubuntu22.04");
    spec.gfd.common = component_spec("nvcr.io/nvidia", "gpu-feature-discovery", "v0.8.2");
    spec.mig_manager.common = component_spec("nvcr.io/nvidia/cloud-native", "k8s-mig-manager", "v0.6.0");
    spec
}

/// Operator settings with the test namespace and no fallback images
pub fn operator_config() -> OperatorConfig {
    OperatorConfig {
        namespace: TEST_NAMESPACE.to_string(),
        ..Default::default()
    }
}

/// Controller reference of the test policy
pub fn owner_ref() -> OwnerReference {
    OwnerReference {
        api_version: "nvidia.com/v1".to_string(),
        kind: "ClusterPolicy".to_string(),
        name: "cluster-policy".to_string(),
        uid: "0b7f4c1e-6a57-4d0e-9a0b-2f4d6c1e9a01".to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// ClusterPolicy object named `name`
pub fn cluster_policy(name: &str, spec: ClusterPolicySpec) -> ClusterPolicy {
    let mut policy = ClusterPolicy::new(name, spec);
    policy.metadata = ObjectMeta {
        name: Some(name.to_string()),
        uid: Some(format!("uid-{}", name)),
        generation: Some(1),
        ..Default::default()
    };
    policy
}

/// Transform inputs borrowing the given values
pub fn transform_context<'a>(
    spec: &'a ClusterPolicySpec,
    facts: &'a EnvironmentFacts,
    config: &'a OperatorConfig,
    owner: Option<&'a OwnerReference>,
) -> TransformContext<'a> {
    TransformContext {
        spec,
        facts,
        config,
        owner,
    }
}

/// Parse a single-document template
pub fn template(yaml: &str) -> ResourceTemplate {
    parse_documents(yaml).unwrap().remove(0)
}

/// Template loader over in-memory YAML, one stream per state
#[derive(Debug, Default)]
pub struct StaticTemplateLoader {
    states: Mutex<BTreeMap<String, String>>,
}

impl StaticTemplateLoader {
    /// Loader knowing the given states
    pub fn new(states: &[(&str, &str)]) -> Self {
        let loader = Self::default();
        for (name, yaml) in states {
            loader.set(name, yaml);
        }
        loader
    }

    /// Replace the templates of a state
    pub fn set(&self, state_name: &str, yaml: &str) {
        self.states.lock().unwrap().insert(state_name.to_string(), yaml.to_string());
    }
}

impl TemplateLoader for StaticTemplateLoader {
    fn load(&self, state_name: &str) -> Result<Vec<ResourceTemplate>, ControllerError> {
        let states = self.states.lock().unwrap();
        let yaml = states
            .get(state_name)
            .ok_or_else(|| ControllerError::TemplateLoad(format!("no manifests for {}", state_name)))?;
        parse_documents(yaml)
    }
}

/// Driver DaemonSet template with an RDMA sidecar and validation init containers
pub const DRIVER_DAEMONSET: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nvidia-driver-daemonset
  labels:
    app: nvidia-driver-daemonset
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
      serviceAccountName: nvidia-driver
      nodeSelector:
        nvidia.com/gpu.deploy.driver: "true"
      initContainers:
        - name: mofed-validation
          image: validator
      containers:
        - name: nvidia-driver-ctr
          image: driver
        - name: nvidia-peermem-ctr
          image: driver
"#;

/// Toolkit DaemonSet template
pub const TOOLKIT_DAEMONSET: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nvidia-container-toolkit-daemonset
  annotations:
    nvidia.com/gpu-operator.container-roles: "nvidia-container-toolkit-ctr=main,driver-validation=driver-validation,mofed-validation=rdma-validation"
spec:
  selector:
    matchLabels:
      app: nvidia-container-toolkit-daemonset
  template:
    metadata:
      labels:
        app: nvidia-container-toolkit-daemonset
    spec:
      initContainers:
        - name: driver-validation
          image: validator
        - name: mofed-validation
          image: validator
      containers:
        - name: nvidia-container-toolkit-ctr
          image: toolkit
      volumes:
        - name: toolkit-install-dir
          hostPath:
            path: /usr/local/nvidia
"#;

/// Plain workload template with a single main container
pub fn simple_daemonset(name: &str) -> String {
    format!(
        r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: {name}
spec:
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: {name}-ctr
          image: placeholder
"#
    )
}

/// Pod spec of a transformed workload
pub fn pod_of(object: &ClusterObject) -> &PodSpec {
    pod_spec(object).expect("workload has a pod spec")
}

/// Regular or init container named `name`
pub fn container<'a>(object: &'a ClusterObject, name: &str) -> &'a Container {
    find_container(object, name).unwrap_or_else(|| panic!("no container named {}", name))
}

/// Regular or init container named `name`, if present
pub fn find_container<'a>(object: &'a ClusterObject, name: &str) -> Option<&'a Container> {
    let pod = pod_of(object);
    pod.containers.iter().chain(pod.init_containers.iter().flatten()).find(|c| c.name == name)
}

/// Literal value of an env var
pub fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
    container
        .env
        .iter()
        .flatten()
        .find(|e| e.name == name)
        .and_then(|e| e.value.as_deref())
}
