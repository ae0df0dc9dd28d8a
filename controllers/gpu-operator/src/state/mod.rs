//! Ordered deployment states.
//!
//! A state groups the templates of one component. Each template is paired
//! with the control that applies it, so a step can never lose its control.
//!
//! - `manager.rs` - the cursor walking states in order
//! - `controls.rs` - per-kind apply and readiness logic
//! - `apply.rs` - pass context and idempotent writes

pub mod apply;
pub mod controls;
pub mod manager;


use crate::component::Component;
use crate::error::ControllerError;
use crate::templates::{ResourceTemplate, TemplateLoader};
use cluster_client::ObjectKind;
use std::fmt;

/// Outcome of applying a step or a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Applied and converged
    Ready,
    /// Applied (or attempted) but not converged yet
    NotReady,
    /// Turned off, or an optional dependency is missing and was not requested
    Disabled,
}

impl ReconcileResult {
    /// Ready and Disabled let the cursor move on
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ReconcileResult::Ready | ReconcileResult::Disabled)
    }

    /// Combine step results: NotReady over Ready over Disabled.
    ///
    /// Disabled only when every step is Disabled, so an optional object after
    /// the workload never hides it. No steps at all count as Ready.
    pub fn aggregate(results: impl IntoIterator<Item = ReconcileResult>) -> ReconcileResult {
        let mut seen = false;
        let mut any_ready = false;
        for result in results {
            match result {
                ReconcileResult::NotReady => return ReconcileResult::NotReady,
                ReconcileResult::Ready => any_ready = true,
                ReconcileResult::Disabled => {}
            }
            seen = true;
        }
        if seen && !any_ready {
            ReconcileResult::Disabled
        } else {
            ReconcileResult::Ready
        }
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileResult::Ready => "Ready",
            ReconcileResult::NotReady => "NotReady",
            ReconcileResult::Disabled => "Disabled",
        })
    }
}

/// How a template is applied and judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Write, ready once the write succeeds
    Simple,
    /// Written only on OpenShift
    SecurityContextConstraints,
    /// Write, ready once every scheduled pod is available
    DaemonSet,
    /// Write, ready once replicas are available and a pod is running
    Deployment,
    /// Prometheus operator object, gated on its CRD
    ServiceMonitor,
    /// Prometheus operator object, gated on its CRD
    PrometheusRule,
}

impl Control {
    /// Control for a template kind
    pub fn for_kind(kind: ObjectKind) -> Result<Self, ControllerError> {
        let control = match kind {
            ObjectKind::Namespace
            | ObjectKind::ServiceAccount
            | ObjectKind::Role
            | ObjectKind::RoleBinding
            | ObjectKind::ClusterRole
            | ObjectKind::ClusterRoleBinding
            | ObjectKind::ConfigMap
            | ObjectKind::RuntimeClass
            | ObjectKind::Service => Control::Simple,
            ObjectKind::SecurityContextConstraints => Control::SecurityContextConstraints,
            ObjectKind::DaemonSet => Control::DaemonSet,
            ObjectKind::Deployment => Control::Deployment,
            ObjectKind::ServiceMonitor => Control::ServiceMonitor,
            ObjectKind::PrometheusRule => Control::PrometheusRule,
            ObjectKind::Pod | ObjectKind::Node => {
                return Err(ControllerError::InvalidTemplate(format!("{} is not a template kind", kind)));
            }
        };
        Ok(control)
    }
}

/// A template and the control applying it
#[derive(Debug, Clone)]
pub struct StateStep {
    /// Template as loaded
    pub template: ResourceTemplate,
    /// Control for the template's kind
    pub control: Control,
}

/// A named group of steps deploying one component
#[derive(Debug, Clone)]
pub struct State {
    /// State name (also the template directory)
    pub name: String,
    /// Component deployed by the state
    pub component: Component,
    /// Steps in apply order
    pub steps: Vec<StateStep>,
}

impl State {
    /// Build a state from its templates
    pub fn new(component: Component, templates: Vec<ResourceTemplate>) -> Result<Self, ControllerError> {
        let steps = templates
            .into_iter()
            .map(|template| {
                let control = Control::for_kind(template.kind())?;
                Ok(StateStep { template, control })
            })
            .collect::<Result<_, ControllerError>>()?;
        Ok(Self {
            name: component.state_name().to_string(),
            component,
            steps,
        })
    }

    /// Load the templates of a component's state
    pub fn load(component: Component, loader: &dyn TemplateLoader) -> Result<Self, ControllerError> {
        Self::new(component, loader.load(component.state_name())?)
    }
}
