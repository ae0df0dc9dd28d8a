//! Operator validator transform.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::{set_env, set_env_specs, update_init_containers, validator_image};
use crate::transform::TransformContext;
use crds::ContainerRuntime;
use k8s_openapi::api::core::v1::{Container, PodSpec};

/// Apply the per-validation settings to the validator pod spec
pub fn transform(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    let validator = &ctx.spec.validator;

    update_init_containers(pod, roles, ContainerRole::DriverValidation, |c| set_env_specs(c, &validator.driver.env))?;
    update_init_containers(pod, roles, ContainerRole::ToolkitValidation, |c| {
        set_env_specs(c, &validator.toolkit.env)
    })?;

    // cuda and plugin validations start workload pods of their own
    let image = validator_image(ctx)?;
    // unset settings are left out rather than passed as empty strings
    let pull_policy = validator.common.image_pull_policy.as_deref().filter(|p| !p.is_empty());
    let pull_secrets = validator.common.image_pull_secrets.join(",");
    let runtime_class = match ctx.spec.operator.default_runtime {
        ContainerRuntime::Containerd => Some(ctx.spec.operator.runtime_class_name()),
        _ => None,
    };
    let workload_env = |container: &mut Container| {
        set_env(container, "VALIDATOR_IMAGE", image.as_str());
        if let Some(policy) = pull_policy {
            set_env(container, "VALIDATOR_IMAGE_PULL_POLICY", policy);
        }
        if !pull_secrets.is_empty() {
            set_env(container, "VALIDATOR_IMAGE_PULL_SECRETS", pull_secrets.as_str());
        }
        if let Some(class) = runtime_class {
            set_env(container, "VALIDATOR_RUNTIME_CLASS", class);
        }
    };

    update_init_containers(pod, roles, ContainerRole::CudaValidation, |c| {
        set_env_specs(c, &validator.cuda.env);
        workload_env(c);
    })?;
    update_init_containers(pod, roles, ContainerRole::PluginValidation, |c| {
        set_env_specs(c, &validator.plugin.env);
        workload_env(c);
    })
}
