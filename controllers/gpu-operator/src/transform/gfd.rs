//! GPU feature discovery DaemonSet transform.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::containers_with_role;
use crate::transform::device_plugin::set_mig_strategy;
use crate::transform::TransformContext;
use k8s_openapi::api::core::v1::PodSpec;

/// Apply the GFD rules to its pod spec
pub fn transform(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        set_mig_strategy(container, "GFD_MIG_STRATEGY", ctx.spec.mig.strategy);
    }
    Ok(())
}
