//! Environment probe.
//!
//! Collects the node facts every pass depends on: which nodes carry GPUs,
//! their kernel and OS fingerprints, whether the control plane is OpenShift
//! and the cluster-wide proxy settings.

use crate::error::ControllerError;
use crate::partition::{partition_by_kernel, KernelPartitionMap};
use cluster_client::{ClusterObject, ClusterStoreTrait, ObjectKind, ProxyConfig};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Label set by discovery on nodes with an NVIDIA GPU
pub const GPU_PRESENT_LABEL: &str = "nvidia.com/gpu.present";

/// Full kernel version discovered on the node
pub const KERNEL_VERSION_LABEL: &str = "feature.node.kubernetes.io/kernel-version.full";

/// OS release ID discovered on the node (e.g., "ubuntu", "rhcos")
pub const OS_ID_LABEL: &str = "feature.node.kubernetes.io/system-os_release.ID";

/// OS release version ID discovered on the node (e.g., "22.04")
pub const OS_VERSION_LABEL: &str = "feature.node.kubernetes.io/system-os_release.VERSION_ID";

/// CRD only present on OpenShift clusters
pub const OPENSHIFT_CRD: &str = "clusterversions.config.openshift.io";

/// Selector for GPU nodes
pub fn gpu_node_selector() -> String {
    format!("{}=true", GPU_PRESENT_LABEL)
}

/// Discovery facts of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFact {
    /// Node name
    pub name: String,
    /// Whether the node has a GPU
    pub gpu_present: bool,
    /// Full kernel version
    pub kernel: String,
    /// OS release ID
    pub os_id: String,
    /// OS release version ID
    pub os_version: String,
}

impl NodeFact {
    /// Build the facts of a GPU node from its labels
    pub fn from_labels(name: &str, labels: &BTreeMap<String, String>) -> Result<Self, ControllerError> {
        Ok(Self {
            name: name.to_string(),
            gpu_present: labels.get(GPU_PRESENT_LABEL).is_some_and(|v| v == "true"),
            kernel: required_label(name, labels, KERNEL_VERSION_LABEL)?,
            os_id: required_label(name, labels, OS_ID_LABEL)?,
            os_version: required_label(name, labels, OS_VERSION_LABEL)?,
        })
    }

    /// OS tag used in image names, `{id}{version}` (e.g., "ubuntu22.04")
    pub fn os_tag(&self) -> String {
        format!("{}{}", self.os_id, self.os_version)
    }
}

fn required_label(node: &str, labels: &BTreeMap<String, String>, key: &str) -> Result<String, ControllerError> {
    labels
        .get(key)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ControllerError::PrerequisiteMissing(format!("GPU node {} has no {} label", node, key)))
}

/// Everything the transforms need to know about the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentFacts {
    /// GPU nodes, ordered by name
    pub nodes: Vec<NodeFact>,
    /// Whether the control plane is OpenShift
    pub openshift: bool,
    /// Cluster-wide proxy settings
    pub proxy: Option<ProxyConfig>,
}

impl EnvironmentFacts {
    /// Whether any node carries a GPU
    pub fn has_gpu_nodes(&self) -> bool {
        self.nodes.iter().any(|n| n.gpu_present)
    }

    /// Fleet-wide OS of the GPU nodes, from the first node by name
    pub fn os(&self) -> Option<&NodeFact> {
        self.nodes.first()
    }

    /// Fleet-wide OS tag
    pub fn os_tag(&self) -> Option<String> {
        self.os().map(NodeFact::os_tag)
    }

    /// GPU nodes grouped by exact kernel version
    pub fn kernel_partitions(&self) -> KernelPartitionMap {
        partition_by_kernel(&self.nodes)
    }

    /// Proxy settings, when any are configured
    pub fn effective_proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref().filter(|p| !p.is_empty())
    }
}

/// Probe the cluster. `timeout` bounds every store call.
pub async fn probe(store: &dyn ClusterStoreTrait, timeout: Duration) -> Result<EnvironmentFacts, ControllerError> {
    let selector = gpu_node_selector();
    let nodes = bounded(timeout, "list GPU nodes", store.list(ObjectKind::Node, None, &selector)).await?;

    let mut facts: Vec<NodeFact> = nodes
        .iter()
        .filter_map(|node| match node {
            ClusterObject::Node(n) => Some(n),
            _ => None,
        })
        .map(|node| {
            let name = node.metadata.name.clone().unwrap_or_default();
            let labels = node.metadata.labels.clone().unwrap_or_default();
            NodeFact::from_labels(&name, &labels)
        })
        .collect::<Result<_, _>>()?;
    facts.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(first) = facts.first() {
        let tag = first.os_tag();
        if let Some(other) = facts.iter().find(|n| n.os_tag() != tag) {
            warn!(
                "GPU nodes run different operating systems ({} on {}, {} on {}); using {}",
                tag,
                first.name,
                other.os_tag(),
                other.name,
                tag
            );
        }
    }

    let openshift = bounded(timeout, "look up OpenShift CRD", store.crd_exists(OPENSHIFT_CRD)).await?;
    let proxy = bounded(timeout, "get cluster proxy", store.get_cluster_proxy()).await?;

    debug!("Probed {} GPU node(s), openshift={}", facts.len(), openshift);
    Ok(EnvironmentFacts { nodes: facts, openshift, proxy })
}

/// Run a store call with a deadline
pub async fn bounded<T, F>(timeout: Duration, what: &str, call: F) -> Result<T, ControllerError>
where
    F: Future<Output = Result<T, cluster_client::StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(ControllerError::Store),
        Err(_) => Err(ControllerError::Timeout(timeout, what.to_string())),
    }
}
