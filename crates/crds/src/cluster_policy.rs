//! ClusterPolicy CRD
//!
//! The single cluster-wide desired state for all GPU operands.

use crate::common::{ComponentSpec, ConfigMapReference, EnvVarSpec, TolerationSpec};
use crate::status::ClusterPolicyStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default host path where the containerized driver is installed
pub const DEFAULT_DRIVER_INSTALL_DIR: &str = "/run/nvidia/driver";

/// Default runtime class name
pub const DEFAULT_RUNTIME_CLASS: &str = "nvidia";

/// Default standalone DCGM host engine port
pub const DEFAULT_DCGM_HOST_PORT: i32 = 5555;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "nvidia.com",
    version = "v1",
    kind = "ClusterPolicy",
    plural = "clusterpolicies",
    shortname = "cp",
    status = "ClusterPolicyStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicySpec {
    /// Operator-wide settings
    #[serde(default)]
    pub operator: OperatorSpec,

    /// Settings shared by every operand DaemonSet
    #[serde(default)]
    pub daemonsets: DaemonsetsSpec,

    /// Driver operand
    #[serde(default)]
    pub driver: DriverSpec,

    /// Container toolkit operand
    #[serde(default)]
    pub toolkit: ToolkitSpec,

    /// Device plugin operand
    #[serde(default)]
    pub device_plugin: DevicePluginSpec,

    /// Standalone DCGM host engine operand
    #[serde(default)]
    pub dcgm: DcgmSpec,

    /// DCGM exporter operand
    #[serde(default)]
    pub dcgm_exporter: DcgmExporterSpec,

    /// GPU feature discovery operand
    #[serde(default)]
    pub gfd: GpuFeatureDiscoverySpec,

    /// MIG strategy
    #[serde(default)]
    pub mig: MigSpec,

    /// MIG manager operand
    #[serde(default)]
    pub mig_manager: MigManagerSpec,

    /// Operator validator operand
    #[serde(default)]
    pub validator: ValidatorSpec,

    /// Container Device Interface settings
    #[serde(default)]
    pub cdi: CdiSpec,

    /// Host paths used by operands
    #[serde(default)]
    pub host_paths: HostPathsSpec,
}

/// Operator-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Container runtime configured as default on the nodes
    #[serde(default)]
    pub default_runtime: ContainerRuntime,

    /// Runtime class name assigned to operand pods (containerd only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class: Option<String>,
}

impl OperatorSpec {
    /// Resolved runtime class name
    pub fn runtime_class_name(&self) -> &str {
        self.runtime_class.as_deref().filter(|n| !n.is_empty()).unwrap_or(DEFAULT_RUNTIME_CLASS)
    }
}

/// Container runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Docker
    Docker,
    /// CRI-O
    Crio,
    /// containerd
    #[default]
    Containerd,
}

impl ContainerRuntime {
    /// Runtime name as understood by the toolkit
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Crio => "crio",
            ContainerRuntime::Containerd => "containerd",
        }
    }
}

/// Settings shared by every operand DaemonSet
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonsetsSpec {
    /// Priority class for all operand pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Tolerations for all operand pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<TolerationSpec>>,

    /// Extra labels added to all operand pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra annotations added to all operand pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Driver operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverSpec {
    /// Deploy the containerized driver (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Manage drivers through the per-node NVIDIADriver CRD instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_nvidia_driver_crd: Option<bool>,

    /// Use images pre-built per kernel version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_precompiled: Option<bool>,

    /// GPUDirect RDMA settings
    #[serde(default)]
    pub rdma: RdmaSpec,

    /// vGPU licensing configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licensing_config: Option<LicensingConfigSpec>,

    /// Custom package repository configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_config: Option<DriverRepoConfigSpec>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl DriverSpec {
    /// Whether the ClusterPolicy itself deploys the driver
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true) && !self.use_nvidia_driver_crd.unwrap_or(false)
    }

    /// Whether precompiled, per-kernel driver images are requested
    pub fn use_precompiled(&self) -> bool {
        self.use_precompiled.unwrap_or(false)
    }
}

/// GPUDirect RDMA settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RdmaSpec {
    /// Enable GPUDirect RDMA
    #[serde(default)]
    pub enabled: bool,

    /// Use the MOFED driver installed on the host
    #[serde(default)]
    pub use_host_mofed: bool,
}

/// vGPU licensing configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LicensingConfigSpec {
    /// ConfigMap holding gridd.conf
    pub config_map_name: String,

    /// Also mount the NLS client configuration token
    #[serde(default)]
    pub nls_enabled: bool,
}

/// Custom package repository configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverRepoConfigSpec {
    /// ConfigMap holding repository files
    pub config_map_name: String,
}

/// Container toolkit operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolkitSpec {
    /// Deploy the toolkit (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Host directory where the toolkit is installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl ToolkitSpec {
    /// Whether the toolkit is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Device plugin operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevicePluginSpec {
    /// Deploy the device plugin (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl DevicePluginSpec {
    /// Whether the device plugin is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Standalone DCGM host engine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DcgmSpec {
    /// Deploy the standalone host engine (default false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Host port the engine listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl DcgmSpec {
    /// Whether the standalone host engine is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Port exposed by the host engine
    pub fn port(&self) -> i32 {
        self.host_port.filter(|p| *p > 0).unwrap_or(DEFAULT_DCGM_HOST_PORT)
    }
}

/// DCGM exporter operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DcgmExporterSpec {
    /// Deploy the exporter (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// ConfigMap with a custom metrics definition file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMapReference>,

    /// Prometheus ServiceMonitor settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_monitor: Option<ServiceMonitorSpec>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl DcgmExporterSpec {
    /// Whether the exporter is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Whether a ServiceMonitor was explicitly requested
    pub fn service_monitor_requested(&self) -> bool {
        self.service_monitor.as_ref().is_some_and(|sm| sm.enabled)
    }
}

/// Prometheus ServiceMonitor settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    /// Create a ServiceMonitor for the exporter
    #[serde(default)]
    pub enabled: bool,
}

/// GPU feature discovery operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuFeatureDiscoverySpec {
    /// Deploy GFD (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl GpuFeatureDiscoverySpec {
    /// Whether GFD is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// MIG strategy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigSpec {
    /// Strategy for exposing MIG devices
    #[serde(default)]
    pub strategy: MigStrategy,
}

/// MIG exposure strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MigStrategy {
    /// MIG devices are not exposed
    #[default]
    None,
    /// All GPUs on a node share the same MIG geometry
    Single,
    /// MIG geometries may differ per GPU
    Mixed,
}

impl MigStrategy {
    /// Strategy name as understood by the operands
    pub fn as_str(&self) -> &'static str {
        match self {
            MigStrategy::None => "none",
            MigStrategy::Single => "single",
            MigStrategy::Mixed => "mixed",
        }
    }
}

/// MIG manager operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigManagerSpec {
    /// Deploy the MIG manager (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// ConfigMap with the mig-parted configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMapReference>,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

impl MigManagerSpec {
    /// Whether the MIG manager is deployed
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Operator validator operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSpec {
    /// Driver validation settings
    #[serde(default)]
    pub driver: SubValidatorSpec,

    /// Toolkit validation settings
    #[serde(default)]
    pub toolkit: SubValidatorSpec,

    /// CUDA workload validation settings
    #[serde(default)]
    pub cuda: SubValidatorSpec,

    /// Device plugin validation settings
    #[serde(default)]
    pub plugin: SubValidatorSpec,

    /// Image and scheduling settings
    #[serde(flatten)]
    pub common: ComponentSpec,
}

/// Per-validation settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubValidatorSpec {
    /// Environment variables for this validation step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
}

/// Container Device Interface settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CdiSpec {
    /// Generate CDI specs for GPUs
    #[serde(default)]
    pub enabled: bool,

    /// Make CDI the default injection mode
    #[serde(default)]
    pub default: bool,
}

/// Host paths used by operands
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostPathsSpec {
    /// Host root filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_fs: Option<String>,

    /// Host directory where the containerized driver is installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_install_dir: Option<String>,
}

impl HostPathsSpec {
    /// Resolved driver install directory
    pub fn driver_install_dir(&self) -> &str {
        self.driver_install_dir.as_deref().filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DRIVER_INSTALL_DIR)
    }

    /// Resolved host root
    pub fn root_fs(&self) -> &str {
        self.root_fs.as_deref().filter(|d| !d.is_empty()).unwrap_or("/")
    }
}
