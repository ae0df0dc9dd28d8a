//! Transform steps shared by every component.

use crate::component::Component;
use crate::error::ControllerError;
use crate::templates::{ContainerRole, ContainerRoles, ResourceTemplate};
use crate::transform::TransformContext;
use cluster_client::ClusterObject;
use crds::{ComponentSpec, ContainerRuntime, EnvVarSpec, ResourceRequirementsSpec, TolerationSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec, ResourceRequirements, Toleration,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Pod spec of a workload object
pub fn pod_spec(object: &ClusterObject) -> Option<&PodSpec> {
    match object {
        ClusterObject::DaemonSet(ds) => ds.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        ClusterObject::Deployment(d) => d.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        _ => None,
    }
}

/// Mutable pod template of a workload object
pub fn pod_template_mut(object: &mut ClusterObject) -> Option<&mut PodTemplateSpec> {
    match object {
        ClusterObject::DaemonSet(ds) => ds.spec.as_mut().map(|s| &mut s.template),
        ClusterObject::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
        _ => None,
    }
}

/// Mutable pod spec of a workload object
pub fn pod_spec_mut(object: &mut ClusterObject) -> Option<&mut PodSpec> {
    pod_template_mut(object).and_then(|t| t.spec.as_mut())
}

/// Pod spec of a workload, or a template error naming the object
pub fn require_pod_spec(object: &mut ClusterObject) -> Result<&mut PodSpec, ControllerError> {
    let key = object.key();
    pod_spec_mut(object).ok_or_else(|| ControllerError::InvalidTemplate(format!("{} has no pod template", key)))
}

/// Resolve the image of a component.
///
/// The policy's coordinates win. The fallback is only used when the policy
/// sets none of them, and gets the suffix appended to its tag.
pub fn resolve_image(
    component: Component,
    spec: &ComponentSpec,
    fallback: Option<&str>,
    suffix: Option<&str>,
) -> Result<String, ControllerError> {
    match spec.image_path(suffix) {
        Ok(Some(image)) => Ok(image),
        Ok(None) => fallback
            .map(|image| suffixed_fallback(image, suffix))
            .ok_or_else(|| ControllerError::InvalidConfig(format!("no image configured for {}", component))),
        Err(e) => Err(ControllerError::InvalidConfig(format!("{}: {}", component, e))),
    }
}

fn suffixed_fallback(image: &str, suffix: Option<&str>) -> String {
    let Some(suffix) = suffix else {
        return image.to_string();
    };
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') || !last_segment.contains(':') {
        return image.to_string();
    }
    format!("{}-{}", image, suffix)
}

/// Set `name` to `value`, in place when present, appended otherwise
pub fn upsert_env(env: &mut Vec<EnvVar>, name: &str, value: impl Into<String>) {
    let value = Some(value.into());
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = value;
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value,
            ..Default::default()
        }),
    }
}

/// Upsert a variable on a container
pub fn set_env(container: &mut Container, name: &str, value: impl Into<String>) {
    upsert_env(container.env.get_or_insert_with(Vec::new), name, value);
}

/// Upsert a list of policy variables on a container
pub fn set_env_specs(container: &mut Container, vars: &[EnvVarSpec]) {
    for var in vars {
        set_env(container, &var.name, var.value.as_str());
    }
}

/// Add a volume unless one with the same name exists
pub fn add_volume(pod: &mut PodSpec, volume: Volume) {
    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

/// Add a mount unless one with the same path exists
pub fn add_volume_mount(container: &mut Container, mount: VolumeMount) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| m.mount_path == mount.mount_path) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

/// Every container (regular or init) carrying `role`
pub fn containers_with_role<'p>(
    pod: &'p mut PodSpec,
    roles: &'p ContainerRoles,
    role: ContainerRole,
) -> impl Iterator<Item = &'p mut Container> + 'p {
    pod.containers
        .iter_mut()
        .chain(pod.init_containers.iter_mut().flatten())
        .filter(move |c| roles.role_of(&c.name) == Some(role))
}

/// Apply `update` to the init containers carrying `role`.
///
/// A template without such an init container is a template error.
pub fn update_init_containers<F>(
    pod: &mut PodSpec,
    roles: &ContainerRoles,
    role: ContainerRole,
    mut update: F,
) -> Result<(), ControllerError>
where
    F: FnMut(&mut Container),
{
    let mut found = false;
    for container in pod.init_containers.iter_mut().flatten() {
        if roles.role_of(&container.name) == Some(role) {
            update(container);
            found = true;
        }
    }
    if !found {
        return Err(ControllerError::InvalidTemplate(format!("no init container has role '{}'", role)));
    }
    Ok(())
}

/// Remove every container (regular or init) carrying `role`
pub fn remove_containers(pod: &mut PodSpec, roles: &ContainerRoles, role: ContainerRole) {
    pod.containers.retain(|c| roles.role_of(&c.name) != Some(role));
    if let Some(init) = pod.init_containers.as_mut() {
        init.retain(|c| roles.role_of(&c.name) != Some(role));
    }
}

/// Apply the component-independent rules to a concrete copy of a template.
///
/// `main_image` overrides the resolved image of the main container, which
/// the driver uses for its per-kernel variants.
pub fn apply_common(
    component: Component,
    template: &ResourceTemplate,
    ctx: &TransformContext<'_>,
    main_image: Option<&str>,
) -> Result<ClusterObject, ControllerError> {
    let mut object = template.object.clone();
    let namespace = ctx.namespace();

    if object.kind().is_namespaced() {
        object.meta_mut().namespace = Some(namespace.to_string());
    }
    if let Some(owner) = ctx.owner.filter(|_| !matches!(object, ClusterObject::Namespace(_))) {
        object.meta_mut().owner_references = Some(vec![owner.clone()]);
    }

    match &mut object {
        ClusterObject::RoleBinding(rb) => {
            for subject in rb.subjects.iter_mut().flatten().filter(|s| s.kind == "ServiceAccount") {
                subject.namespace = Some(namespace.to_string());
            }
        }
        ClusterObject::ClusterRoleBinding(crb) => {
            for subject in crb.subjects.iter_mut().flatten().filter(|s| s.kind == "ServiceAccount") {
                subject.namespace = Some(namespace.to_string());
            }
        }
        ClusterObject::RuntimeClass(rc) => {
            let name = ctx.spec.operator.runtime_class_name();
            rc.metadata.name = Some(name.to_string());
            rc.handler = name.to_string();
        }
        _ => {}
    }

    if pod_spec(&object).is_some() {
        apply_pod_settings(component, template, ctx, main_image, &mut object)?;
    }
    Ok(object)
}

fn apply_pod_settings(
    component: Component,
    template: &ResourceTemplate,
    ctx: &TransformContext<'_>,
    main_image: Option<&str>,
    object: &mut ClusterObject,
) -> Result<(), ControllerError> {
    let daemonsets = &ctx.spec.daemonsets;
    let settings = component.spec(ctx.spec);

    if let Some(pod_template) = pod_template_mut(object) {
        let meta = pod_template.metadata.get_or_insert_with(Default::default);
        insert_absent(meta.labels.get_or_insert_with(BTreeMap::new), &daemonsets.labels);
        insert_absent(meta.annotations.get_or_insert_with(BTreeMap::new), &daemonsets.annotations);
    }

    let key = object.key();
    let pod = require_pod_spec(object)?;

    if let Some(priority) = settings
        .and_then(|s| s.priority_class_name.as_ref())
        .or(daemonsets.priority_class_name.as_ref())
    {
        pod.priority_class_name = Some(priority.clone());
    }
    if let Some(tolerations) = settings.and_then(|s| s.tolerations.as_ref()).or(daemonsets.tolerations.as_ref()) {
        pod.tolerations = Some(tolerations.iter().map(toleration).collect());
    }

    if let Some(settings) = settings {
        let image = match main_image {
            Some(image) => image.to_string(),
            None => {
                let suffix = if component.os_suffixed() { ctx.facts.os_tag() } else { None };
                resolve_image(component, settings, ctx.config.fallback_image(component), suffix.as_deref())?
            }
        };
        apply_component_settings(pod, &template.roles, settings, &image, &key)?;
    }

    if component.uses_runtime_class() && ctx.spec.operator.default_runtime == ContainerRuntime::Containerd {
        pod.runtime_class_name = Some(ctx.spec.operator.runtime_class_name().to_string());
    }

    let has_validation = pod
        .init_containers
        .iter()
        .flatten()
        .any(|c| template.roles.role_of(&c.name).is_some_and(|r| r.is_validation()));
    if has_validation {
        let image = validator_image(ctx)?;
        let pull_policy = ctx.spec.validator.common.image_pull_policy.clone();
        for container in pod.init_containers.iter_mut().flatten() {
            if template.roles.role_of(&container.name).is_some_and(|r| r.is_validation()) {
                container.image = Some(image.clone());
                if pull_policy.is_some() {
                    container.image_pull_policy = pull_policy.clone();
                }
            }
        }
    }
    Ok(())
}

fn apply_component_settings(
    pod: &mut PodSpec,
    roles: &ContainerRoles,
    settings: &ComponentSpec,
    image: &str,
    key: &str,
) -> Result<(), ControllerError> {
    let mut found = false;
    for container in containers_with_role(pod, roles, ContainerRole::Main) {
        found = true;
        container.image = Some(image.to_string());
        if let Some(policy) = &settings.image_pull_policy {
            container.image_pull_policy = Some(policy.clone());
        }
        if !settings.args.is_empty() {
            container.args = Some(settings.args.clone());
        }
        set_env_specs(container, &settings.env);
        if let Some(resources) = &settings.resources {
            container.resources = Some(resource_requirements(resources));
        }
    }
    if !found {
        return Err(ControllerError::InvalidTemplate(format!("{} has no main container", key)));
    }

    if !settings.image_pull_secrets.is_empty() {
        let secrets = pod.image_pull_secrets.get_or_insert_with(Vec::new);
        for name in &settings.image_pull_secrets {
            if !secrets.iter().any(|s| &s.name == name) {
                secrets.push(LocalObjectReference { name: name.clone() });
            }
        }
    }
    if let Some(selector) = &settings.node_selector {
        pod.node_selector = Some(selector.clone());
    }
    if let Some(affinity) = &settings.affinity {
        let affinity: Affinity = serde_json::from_value(affinity.clone())
            .map_err(|e| ControllerError::InvalidConfig(format!("invalid affinity: {}", e)))?;
        pod.affinity = Some(affinity);
    }
    Ok(())
}

/// Image of the operator validator, used by validation init containers
pub fn validator_image(ctx: &TransformContext<'_>) -> Result<String, ControllerError> {
    resolve_image(
        Component::OperatorValidation,
        &ctx.spec.validator.common,
        ctx.config.fallback_image(Component::OperatorValidation),
        None,
    )
}

fn insert_absent(target: &mut BTreeMap<String, String>, extra: &BTreeMap<String, String>) {
    for (key, value) in extra {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn toleration(spec: &TolerationSpec) -> Toleration {
    Toleration {
        key: spec.key.clone(),
        operator: spec.operator.clone(),
        value: spec.value.clone(),
        effect: spec.effect.clone(),
        toleration_seconds: spec.toleration_seconds,
    }
}

fn resource_requirements(spec: &ResourceRequirementsSpec) -> ResourceRequirements {
    let quantities = |map: &BTreeMap<String, String>| {
        (!map.is_empty()).then(|| map.iter().map(|(k, v)| (k.clone(), Quantity(v.clone()))).collect())
    };
    ResourceRequirements {
        limits: quantities(&spec.limits),
        requests: quantities(&spec.requests),
        ..Default::default()
    }
}
