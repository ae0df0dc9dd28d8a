//! Container toolkit DaemonSet transform.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::{
    add_volume, add_volume_mount, containers_with_role, remove_containers, set_env, update_init_containers,
};
use crate::transform::TransformContext;
use crds::{ContainerRuntime, EnvVarSpec};
use k8s_openapi::api::core::v1::{HostPathVolumeSource, PodSpec, Volume, VolumeMount};
use std::path::Path;

const RUNTIME_CONFIG_DIR: &str = "/runtime/config-dir/";
const RUNTIME_SOCKET_DIR: &str = "/runtime/sock-dir/";
const RUNTIME_CONFIG_VOLUME: &str = "runtime-config-dir";
const RUNTIME_SOCKET_VOLUME: &str = "runtime-sock-dir";
const INSTALL_DIR_VOLUME: &str = "toolkit-install-dir";

/// Host config file and socket of a runtime, before overrides
pub fn runtime_defaults(runtime: ContainerRuntime) -> Option<(&'static str, &'static str)> {
    match runtime {
        ContainerRuntime::Containerd => Some(("/etc/containerd/config.toml", "/run/containerd/containerd.sock")),
        ContainerRuntime::Docker => Some(("/etc/docker/daemon.json", "/var/run/docker.sock")),
        ContainerRuntime::Crio => None,
    }
}

/// Apply the toolkit rules to its pod spec
pub fn transform(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    let spec = ctx.spec;
    if spec.driver.rdma.enabled {
        update_init_containers(pod, roles, ContainerRole::RdmaValidation, |c| set_env(c, "ENABLE_RDMA", "true"))?;
    } else {
        remove_containers(pod, roles, ContainerRole::RdmaValidation);
    }

    let driver_root = if spec.driver.is_enabled() {
        spec.host_paths.driver_install_dir()
    } else {
        spec.host_paths.root_fs()
    };
    let runtime = spec.operator.default_runtime;
    let host_paths = runtime_defaults(runtime).map(|(config, socket)| {
        let (config_env, socket_env) = match runtime {
            ContainerRuntime::Docker => ("DOCKER_CONFIG", "DOCKER_SOCKET"),
            _ => ("CONTAINERD_CONFIG", "CONTAINERD_SOCKET"),
        };
        let config = env_override(&spec.toolkit.common.env, config_env).unwrap_or(config).to_string();
        let socket = env_override(&spec.toolkit.common.env, socket_env).unwrap_or(socket).to_string();
        (config, socket)
    });

    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        set_env(container, "NVIDIA_DRIVER_ROOT", driver_root);
        set_env(container, "RUNTIME", runtime.as_str());
        if spec.cdi.enabled {
            set_env(container, "CDI_ENABLED", "true");
            if spec.cdi.default {
                set_env(container, "NVIDIA_CONTAINER_RUNTIME_MODE", "cdi");
            }
        }
        if let Some((config, socket)) = &host_paths {
            set_env(container, "RUNTIME_CONFIG", format!("{}{}", RUNTIME_CONFIG_DIR, file_name(config)));
            set_env(container, "RUNTIME_SOCKET", format!("{}{}", RUNTIME_SOCKET_DIR, file_name(socket)));
            set_env(
                container,
                "RUNTIME_ARGS",
                format!("--config {} --socket {}", file_name(config), file_name(socket)),
            );
            add_volume_mount(container, mount(RUNTIME_CONFIG_VOLUME, RUNTIME_CONFIG_DIR));
            add_volume_mount(container, mount(RUNTIME_SOCKET_VOLUME, RUNTIME_SOCKET_DIR));
        }
    }

    if let Some((config, socket)) = &host_paths {
        add_volume(pod, host_path_volume(RUNTIME_CONFIG_VOLUME, parent_dir(config)));
        add_volume(pod, host_path_volume(RUNTIME_SOCKET_VOLUME, parent_dir(socket)));
    }

    if let Some(install_dir) = spec.toolkit.install_dir.as_deref().filter(|d| !d.is_empty()) {
        if let Some(volume) = pod.volumes.iter_mut().flatten().find(|v| v.name == INSTALL_DIR_VOLUME) {
            volume.host_path = Some(HostPathVolumeSource {
                path: install_dir.to_string(),
                ..Default::default()
            });
        }
    }
    Ok(())
}

fn env_override<'a>(env: &'a [EnvVarSpec], name: &str) -> Option<&'a str> {
    env.iter().find(|e| e.name == name).map(|e| e.value.as_str()).filter(|v| !v.is_empty())
}

fn file_name(path: &str) -> &str {
    Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
}

fn mount(volume: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn host_path_volume(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}
