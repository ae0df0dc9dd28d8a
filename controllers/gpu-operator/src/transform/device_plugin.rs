//! Device plugin DaemonSet transform.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::{containers_with_role, set_env};
use crate::transform::TransformContext;
use crds::MigStrategy;
use k8s_openapi::api::core::v1::{Container, PodSpec};

/// Set the MIG strategy under `name`, plus device monitoring when MIG is on
pub fn set_mig_strategy(container: &mut Container, name: &str, strategy: MigStrategy) {
    set_env(container, name, strategy.as_str());
    if strategy != MigStrategy::None {
        set_env(container, "NVIDIA_MIG_MONITOR_DEVICES", "all");
    }
}

/// Apply the device plugin rules to its pod spec
pub fn transform(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        set_mig_strategy(container, "MIG_STRATEGY", ctx.spec.mig.strategy);
        if ctx.spec.cdi.enabled {
            set_env(container, "CDI_ENABLED", "true");
            set_env(container, "DEVICE_LIST_STRATEGY", "envvar,cdi-annotations");
        }
    }
    Ok(())
}
