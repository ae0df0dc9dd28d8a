//! Template transforms.
//!
//! Every transform is a pure function of the template, the policy and the
//! probed environment. The shared rules in `common.rs` run first, then the
//! component's own rules edit the pod spec of workload templates.

pub mod common;
pub mod dcgm;
pub mod device_plugin;
pub mod driver;
pub mod gfd;
pub mod mig_manager;
pub mod toolkit;
pub mod validator;

#[cfg(test)]
mod common_test;
#[cfg(test)]
mod dcgm_test;
#[cfg(test)]
mod validator_test;

use crate::component::Component;
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::probe::EnvironmentFacts;
use crate::templates::ResourceTemplate;
use cluster_client::{ClusterObject, ObjectKind};
use crds::ClusterPolicySpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Read-only inputs of a transform
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Desired state
    pub spec: &'a ClusterPolicySpec,
    /// Probed environment
    pub facts: &'a EnvironmentFacts,
    /// Operator settings
    pub config: &'a OperatorConfig,
    /// Controller reference set on every object except Namespace
    pub owner: Option<&'a OwnerReference>,
}

impl TransformContext<'_> {
    /// Operand namespace
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }
}

/// Turn a template into the concrete object(s) to write
pub fn transform(
    component: Component,
    template: &ResourceTemplate,
    ctx: &TransformContext<'_>,
) -> Result<Vec<ClusterObject>, ControllerError> {
    if component == Component::Driver && template.kind() == ObjectKind::DaemonSet {
        return driver::transform_variants(template, ctx);
    }

    let mut object = common::apply_common(component, template, ctx, None)?;
    if let Some(pod) = common::pod_spec_mut(&mut object) {
        let roles = &template.roles;
        match component {
            Component::ContainerToolkit => toolkit::transform(pod, roles, ctx)?,
            Component::OperatorValidation => validator::transform(pod, roles, ctx)?,
            Component::DevicePlugin => device_plugin::transform(pod, roles, ctx)?,
            Component::Dcgm => dcgm::transform_host_engine(pod, roles, ctx)?,
            Component::DcgmExporter => dcgm::transform_exporter(pod, roles, ctx)?,
            Component::GpuFeatureDiscovery => gfd::transform(pod, roles, ctx)?,
            Component::MigManager => mig_manager::transform(pod, roles, ctx)?,
            Component::PreRequisites | Component::Driver => {}
        }
    }
    Ok(vec![object])
}
