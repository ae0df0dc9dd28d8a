//! DCGM host engine and DCGM exporter transforms.

use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles};
use crate::transform::common::{add_volume, add_volume_mount, containers_with_role, set_env};
use crate::transform::TransformContext;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector,
    PodSpec, SecurityContext, Volume, VolumeMount,
};

const METRICS_VOLUME: &str = "metrics-config";
const METRICS_KEY: &str = "dcgm-metrics.csv";
const METRICS_PATH: &str = "/etc/dcgm-exporter/dcgm-metrics.csv";

const POD_RESOURCES_VOLUME: &str = "pod-gpu-resources";
const POD_RESOURCES_DIR: &str = "/var/lib/kubelet/pod-resources";
const RELABEL_INIT_CONTAINER: &str = "init-pod-nvidia-metrics-exporter";

/// Expose the host engine on the configured port
pub fn transform_host_engine(
    pod: &mut PodSpec,
    roles: &ContainerRoles,
    ctx: &TransformContext<'_>,
) -> Result<(), ControllerError> {
    let port = ctx.spec.dcgm.port();
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        let ports = container.ports.get_or_insert_with(Vec::new);
        match ports.first_mut() {
            Some(existing) => {
                existing.container_port = port;
                existing.host_port = Some(port);
            }
            None => ports.push(ContainerPort {
                name: Some("dcgm".to_string()),
                container_port: port,
                host_port: Some(port),
                ..Default::default()
            }),
        }
    }
    Ok(())
}

/// Apply the exporter rules to its pod spec
pub fn transform_exporter(
    pod: &mut PodSpec,
    roles: &ContainerRoles,
    ctx: &TransformContext<'_>,
) -> Result<(), ControllerError> {
    let spec = ctx.spec;
    let metrics_config = spec.dcgm_exporter.config.as_ref().map(|c| c.name.as_str()).filter(|n| !n.is_empty());

    let mut main_image = None;
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        if spec.dcgm.is_enabled() {
            set_node_ip(container);
            set_env(container, "DCGM_REMOTE_HOSTENGINE_INFO", format!("$(NODE_IP):{}", spec.dcgm.port()));
        }
        if metrics_config.is_some() {
            set_env(container, "DCGM_EXPORTER_COLLECTORS", METRICS_PATH);
            add_volume_mount(
                container,
                VolumeMount {
                    name: METRICS_VOLUME.to_string(),
                    mount_path: METRICS_PATH.to_string(),
                    sub_path: Some(METRICS_KEY.to_string()),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        }
        main_image = main_image.or_else(|| container.image.clone());
    }

    if let Some(config_map) = metrics_config {
        add_volume(
            pod,
            Volume {
                name: METRICS_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
    }

    if ctx.facts.openshift {
        add_relabel_init_container(pod, main_image);
    }
    Ok(())
}

fn set_node_ip(container: &mut Container) {
    let env = container.env.get_or_insert_with(Vec::new);
    let node_ip = EnvVar {
        name: "NODE_IP".to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "status.hostIP".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    };
    match env.iter_mut().find(|e| e.name == "NODE_IP") {
        Some(existing) => *existing = node_ip,
        None => env.push(node_ip),
    }
}

// SELinux blocks the exporter from the kubelet socket until the directory is relabelled
fn add_relabel_init_container(pod: &mut PodSpec, image: Option<String>) {
    add_volume(
        pod,
        Volume {
            name: POD_RESOURCES_VOLUME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: POD_RESOURCES_DIR.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    );

    let init = Container {
        name: RELABEL_INIT_CONTAINER.to_string(),
        image,
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        args: Some(vec![format!("chcon -t container_file_t {}", POD_RESOURCES_DIR)]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: POD_RESOURCES_VOLUME.to_string(),
            mount_path: POD_RESOURCES_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let init_containers = pod.init_containers.get_or_insert_with(Vec::new);
    match init_containers.iter_mut().find(|c| c.name == RELABEL_INIT_CONTAINER) {
        Some(existing) => *existing = init,
        None => init_containers.push(init),
    }
}
