//! Driver DaemonSet transform.

use crate::component::Component;
use crate::error::ControllerError;
use crate::partition::{driver_variants, kernel_label_value, DriverVariant, DRIVER_FAMILY_LABEL, DRIVER_KERNEL_LABEL};
use crate::probe::KERNEL_VERSION_LABEL;
use crate::templates::{ContainerRole, ContainerRoles, ResourceTemplate};
use crate::transform::common::{
    add_volume, add_volume_mount, apply_common, containers_with_role, remove_containers, require_pod_spec, set_env,
    update_init_containers,
};
use crate::transform::TransformContext;
use cluster_client::{ClusterObject, ProxyConfig};
use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, KeyToPath, PodSpec, Volume, VolumeMount};
use std::collections::BTreeMap;

/// ConfigMap the cluster CA bundle is injected into
pub const TRUSTED_CA_CONFIGMAP: &str = "gpu-operator-trusted-ca";

/// Label asking OpenShift to inject the trusted CA bundle
pub const TRUSTED_CA_INJECT_LABEL: &str = "config.openshift.io/inject-trusted-cabundle";

const TRUSTED_CA_VOLUME: &str = "gpu-operator-trusted-ca";
const TRUSTED_CA_MOUNT: &str = "/etc/pki/ca-trust/extracted/pem";
const TRUSTED_CA_KEY: &str = "ca-bundle.crt";
const TRUSTED_CA_FILE: &str = "tls-ca-bundle.pem";

const LICENSING_VOLUME: &str = "licensing-config";
const GRIDD_CONF: &str = "gridd.conf";
const GRIDD_CONF_PATH: &str = "/drivers/gridd.conf";
const CLIENT_TOKEN: &str = "client_configuration_token.tok";
const CLIENT_TOKEN_PATH: &str = "/drivers/ClientConfigToken/client_configuration_token.tok";

const REPO_CONFIG_VOLUME: &str = "repo-config";

/// One DaemonSet per driver variant of the current fleet
pub fn transform_variants(
    template: &ResourceTemplate,
    ctx: &TransformContext<'_>,
) -> Result<Vec<ClusterObject>, ControllerError> {
    let fallback = ctx.config.fallback_image(Component::Driver);
    driver_variants(template.name(), &ctx.spec.driver, fallback, ctx.facts)?
        .iter()
        .map(|variant| transform_variant(template, ctx, variant))
        .collect()
}

/// Concrete DaemonSet of one variant
pub fn transform_variant(
    template: &ResourceTemplate,
    ctx: &TransformContext<'_>,
    variant: &DriverVariant,
) -> Result<ClusterObject, ControllerError> {
    let mut object = apply_common(Component::Driver, template, ctx, Some(&variant.image))?;
    let kernel_label = variant.kernel.as_deref().map(kernel_label_value);

    let meta = object.meta_mut();
    meta.name = Some(variant.name.clone());
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(DRIVER_FAMILY_LABEL.to_string(), template.name().to_string());
    if let Some(kernel) = &kernel_label {
        labels.insert(DRIVER_KERNEL_LABEL.to_string(), kernel.clone());
    }

    // Variants share the template's selector, so each one adds its kernel to keep pods apart
    if let (ClusterObject::DaemonSet(ds), Some(kernel)) = (&mut object, &kernel_label) {
        if let Some(spec) = ds.spec.as_mut() {
            spec.selector
                .match_labels
                .get_or_insert_with(BTreeMap::new)
                .insert(DRIVER_KERNEL_LABEL.to_string(), kernel.clone());
            spec.template
                .metadata
                .get_or_insert_with(Default::default)
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(DRIVER_KERNEL_LABEL.to_string(), kernel.clone());
        }
    }

    let roles = &template.roles;
    let pod = require_pod_spec(&mut object)?;

    if let Some(kernel) = &variant.kernel {
        pod.node_selector
            .get_or_insert_with(BTreeMap::new)
            .insert(KERNEL_VERSION_LABEL.to_string(), kernel.clone());
    }
    for sidecar in containers_with_role(pod, roles, ContainerRole::RdmaSidecar) {
        sidecar.image = Some(variant.image.clone());
    }

    configure_rdma(pod, roles, ctx)?;
    mount_licensing(pod, roles, ctx);
    mount_repo_config(pod, roles, ctx, &variant.os_id)?;
    if let Some(proxy) = ctx.facts.effective_proxy() {
        apply_proxy(pod, roles, proxy);
    }
    Ok(object)
}

fn configure_rdma(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) -> Result<(), ControllerError> {
    let rdma = &ctx.spec.driver.rdma;
    if !rdma.enabled {
        remove_containers(pod, roles, ContainerRole::RdmaSidecar);
        remove_containers(pod, roles, ContainerRole::RdmaValidation);
        return Ok(());
    }

    let host_mofed = rdma.use_host_mofed.to_string();
    for role in [ContainerRole::Main, ContainerRole::RdmaSidecar] {
        for container in containers_with_role(pod, roles, role) {
            set_env(container, "ENABLE_RDMA", "true");
            set_env(container, "USE_HOST_MOFED", host_mofed.as_str());
        }
    }
    update_init_containers(pod, roles, ContainerRole::RdmaValidation, |container| {
        set_env(container, "ENABLE_RDMA", "true");
        set_env(container, "USE_HOST_MOFED", host_mofed.as_str());
    })
}

fn mount_licensing(pod: &mut PodSpec, roles: &ContainerRoles, ctx: &TransformContext<'_>) {
    let Some(licensing) = ctx.spec.driver.licensing_config.as_ref().filter(|l| !l.config_map_name.is_empty()) else {
        return;
    };

    let mut items = vec![key_to_path(GRIDD_CONF, GRIDD_CONF)];
    if licensing.nls_enabled {
        items.push(key_to_path(CLIENT_TOKEN, CLIENT_TOKEN));
    }
    add_volume(pod, config_map_volume(LICENSING_VOLUME, &licensing.config_map_name, Some(items)));

    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        add_volume_mount(container, sub_path_mount(LICENSING_VOLUME, GRIDD_CONF_PATH, GRIDD_CONF));
        if licensing.nls_enabled {
            add_volume_mount(container, sub_path_mount(LICENSING_VOLUME, CLIENT_TOKEN_PATH, CLIENT_TOKEN));
        }
    }
}

/// Package repository directory of an OS release ID
pub fn repo_config_dir(os_id: &str) -> Result<&'static str, ControllerError> {
    match os_id {
        "ubuntu" | "debian" => Ok("/etc/apt/sources.list.d"),
        "rhel" | "centos" | "rhcos" | "rocky" => Ok("/etc/yum.repos.d"),
        "sles" => Ok("/etc/zypp/repos.d"),
        other => Err(ControllerError::InvalidConfig(format!(
            "custom repository config is not supported on OS '{}'",
            other
        ))),
    }
}

fn mount_repo_config(
    pod: &mut PodSpec,
    roles: &ContainerRoles,
    ctx: &TransformContext<'_>,
    os_id: &str,
) -> Result<(), ControllerError> {
    let Some(repo) = ctx.spec.driver.repo_config.as_ref().filter(|r| !r.config_map_name.is_empty()) else {
        return Ok(());
    };
    let dir = repo_config_dir(os_id)?;

    add_volume(pod, config_map_volume(REPO_CONFIG_VOLUME, &repo.config_map_name, None));
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        add_volume_mount(
            container,
            VolumeMount {
                name: REPO_CONFIG_VOLUME.to_string(),
                mount_path: dir.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        );
    }
    Ok(())
}

fn apply_proxy(pod: &mut PodSpec, roles: &ContainerRoles, proxy: &ProxyConfig) {
    let vars = [
        ("HTTPS_PROXY", proxy.https_proxy.as_deref()),
        ("HTTP_PROXY", proxy.http_proxy.as_deref()),
        ("NO_PROXY", proxy.no_proxy.as_deref()),
    ];

    let trusted_ca = proxy.trusted_ca.is_some();
    if trusted_ca {
        let items = vec![key_to_path(TRUSTED_CA_KEY, TRUSTED_CA_FILE)];
        add_volume(pod, config_map_volume(TRUSTED_CA_VOLUME, TRUSTED_CA_CONFIGMAP, Some(items)));
    }

    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        for (name, value) in vars {
            if let Some(value) = value {
                set_env(container, name, value);
                set_env(container, &name.to_ascii_lowercase(), value);
            }
        }
        if trusted_ca {
            add_volume_mount(
                container,
                VolumeMount {
                    name: TRUSTED_CA_VOLUME.to_string(),
                    mount_path: TRUSTED_CA_MOUNT.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        }
    }
}

fn config_map_volume(volume: &str, config_map: &str, items: Option<Vec<KeyToPath>>) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            items,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: path.to_string(),
        ..Default::default()
    }
}

fn sub_path_mount(volume: &str, mount_path: &str, sub_path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: mount_path.to_string(),
        sub_path: Some(sub_path.to_string()),
        read_only: Some(true),
        ..Default::default()
    }
}
