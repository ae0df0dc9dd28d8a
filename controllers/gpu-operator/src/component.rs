//! Operand components and the states they are deployed by.

use crds::{ClusterPolicySpec, ComponentSpec};
use std::fmt;

/// A GPU operand, one per state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Namespace, RBAC and RuntimeClass shared by all operands
    PreRequisites,
    /// Containerized NVIDIA driver
    Driver,
    /// NVIDIA container toolkit (runtime integration)
    ContainerToolkit,
    /// Operator validator
    OperatorValidation,
    /// Kubernetes device plugin
    DevicePlugin,
    /// Standalone DCGM host engine
    Dcgm,
    /// DCGM metrics exporter
    DcgmExporter,
    /// GPU feature discovery
    GpuFeatureDiscovery,
    /// MIG manager
    MigManager,
}

impl Component {
    /// Every component in state order
    pub const ALL: [Component; 9] = [
        Component::PreRequisites,
        Component::Driver,
        Component::ContainerToolkit,
        Component::OperatorValidation,
        Component::DevicePlugin,
        Component::Dcgm,
        Component::DcgmExporter,
        Component::GpuFeatureDiscovery,
        Component::MigManager,
    ];

    /// Name of the state (and template directory) deploying this component
    pub fn state_name(&self) -> &'static str {
        match self {
            Component::PreRequisites => "pre-requisites",
            Component::Driver => "state-driver",
            Component::ContainerToolkit => "state-container-toolkit",
            Component::OperatorValidation => "state-operator-validation",
            Component::DevicePlugin => "state-device-plugin",
            Component::Dcgm => "state-dcgm",
            Component::DcgmExporter => "state-dcgm-exporter",
            Component::GpuFeatureDiscovery => "gpu-feature-discovery",
            Component::MigManager => "state-mig-manager",
        }
    }

    /// Whether the policy deploys this component
    pub fn is_enabled(&self, spec: &ClusterPolicySpec) -> bool {
        match self {
            Component::PreRequisites | Component::OperatorValidation => true,
            Component::Driver => spec.driver.is_enabled(),
            Component::ContainerToolkit => spec.toolkit.is_enabled(),
            Component::DevicePlugin => spec.device_plugin.is_enabled(),
            Component::Dcgm => spec.dcgm.is_enabled(),
            Component::DcgmExporter => spec.dcgm_exporter.is_enabled(),
            Component::GpuFeatureDiscovery => spec.gfd.is_enabled(),
            Component::MigManager => spec.mig_manager.is_enabled(),
        }
    }

    /// Image and scheduling settings of the component
    pub fn spec<'a>(&self, spec: &'a ClusterPolicySpec) -> Option<&'a ComponentSpec> {
        match self {
            Component::PreRequisites => None,
            Component::Driver => Some(&spec.driver.common),
            Component::ContainerToolkit => Some(&spec.toolkit.common),
            Component::OperatorValidation => Some(&spec.validator.common),
            Component::DevicePlugin => Some(&spec.device_plugin.common),
            Component::Dcgm => Some(&spec.dcgm.common),
            Component::DcgmExporter => Some(&spec.dcgm_exporter.common),
            Component::GpuFeatureDiscovery => Some(&spec.gfd.common),
            Component::MigManager => Some(&spec.mig_manager.common),
        }
    }

    /// Environment variable holding the fallback image
    pub fn image_env(&self) -> Option<&'static str> {
        match self {
            Component::PreRequisites => None,
            Component::Driver => Some("DRIVER_IMAGE"),
            Component::ContainerToolkit => Some("CONTAINER_TOOLKIT_IMAGE"),
            Component::OperatorValidation => Some("VALIDATOR_IMAGE"),
            Component::DevicePlugin => Some("DEVICE_PLUGIN_IMAGE"),
            Component::Dcgm => Some("DCGM_IMAGE"),
            Component::DcgmExporter => Some("DCGM_EXPORTER_IMAGE"),
            Component::GpuFeatureDiscovery => Some("GFD_IMAGE"),
            Component::MigManager => Some("MIG_MANAGER_IMAGE"),
        }
    }

    /// Images built per OS, tagged `version-{osTag}`
    pub fn os_suffixed(&self) -> bool {
        matches!(self, Component::Driver | Component::MigManager)
    }

    /// Operand pods that run GPU workloads through the NVIDIA runtime class
    pub fn uses_runtime_class(&self) -> bool {
        !matches!(self, Component::PreRequisites | Component::Driver | Component::ContainerToolkit)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}
