//! MIG manager DaemonSet transform.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::{add_volume, add_volume_mount, containers_with_role, set_env};
use crate::transform::TransformContext;
use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, PodSpec, Volume, VolumeMount};

/// ConfigMap mounted when the policy names none
pub const DEFAULT_MIG_CONFIG: &str = "default-mig-parted-config";

const CONFIG_VOLUME: &str = "mig-parted-config";
const CONFIG_DIR: &str = "/mig-parted-config";
const CONFIG_FILE: &str = "/mig-parted-config/config.yaml";

/// Apply the MIG manager rules to its pod spec
pub fn transform(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    let config_map = ctx
        .spec
        .mig_manager
        .config
        .as_ref()
        .map(|c| c.name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_MIG_CONFIG);

    add_volume(
        pod,
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        set_env(container, "CONFIG_FILE", CONFIG_FILE);
        add_volume_mount(
            container,
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_DIR.to_string(),
                ..Default::default()
            },
        );
    }
    Ok(())
}
