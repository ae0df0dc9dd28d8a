//! Typed cluster objects handled by the store
//!
//! `ClusterObject` wraps each Kubernetes kind the operator manages. Kinds
//! without k8s-openapi types (Prometheus operator, OpenShift SCC) are carried
//! as `DynamicObject`.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service, ServiceAccount};
use k8s_openapi::api::node::v1::RuntimeClass;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde::Serialize;
use std::fmt;

/// Kinds the cluster store understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Namespace,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    RuntimeClass,
    SecurityContextConstraints,
    DaemonSet,
    Deployment,
    Service,
    ServiceMonitor,
    PrometheusRule,
    Pod,
    Node,
}

impl ObjectKind {
    /// Kubernetes `kind` string
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Namespace => "Namespace",
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::RuntimeClass => "RuntimeClass",
            ObjectKind::SecurityContextConstraints => "SecurityContextConstraints",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::Service => "Service",
            ObjectKind::ServiceMonitor => "ServiceMonitor",
            ObjectKind::PrometheusRule => "PrometheusRule",
            ObjectKind::Pod => "Pod",
            ObjectKind::Node => "Node",
        }
    }

    /// Parse a Kubernetes `kind` string
    pub fn from_kind(kind: &str) -> Option<Self> {
        let kind = match kind {
            "Namespace" => ObjectKind::Namespace,
            "ServiceAccount" => ObjectKind::ServiceAccount,
            "Role" => ObjectKind::Role,
            "RoleBinding" => ObjectKind::RoleBinding,
            "ClusterRole" => ObjectKind::ClusterRole,
            "ClusterRoleBinding" => ObjectKind::ClusterRoleBinding,
            "ConfigMap" => ObjectKind::ConfigMap,
            "RuntimeClass" => ObjectKind::RuntimeClass,
            "SecurityContextConstraints" => ObjectKind::SecurityContextConstraints,
            "DaemonSet" => ObjectKind::DaemonSet,
            "Deployment" => ObjectKind::Deployment,
            "Service" => ObjectKind::Service,
            "ServiceMonitor" => ObjectKind::ServiceMonitor,
            "PrometheusRule" => ObjectKind::PrometheusRule,
            "Pod" => ObjectKind::Pod,
            "Node" => ObjectKind::Node,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether objects of this kind live in a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            ObjectKind::Namespace
                | ObjectKind::ClusterRole
                | ObjectKind::ClusterRoleBinding
                | ObjectKind::RuntimeClass
                | ObjectKind::SecurityContextConstraints
                | ObjectKind::Node
        )
    }

    /// Kinds that are created once and never updated afterwards
    pub fn is_create_only(&self) -> bool {
        matches!(self, ObjectKind::Namespace | ObjectKind::ServiceAccount)
    }

    /// API resource for kinds without k8s-openapi types
    pub fn dynamic_resource(&self) -> Option<ApiResource> {
        let (group, version, kind, plural) = match self {
            ObjectKind::ServiceMonitor => ("monitoring.coreos.com", "v1", "ServiceMonitor", "servicemonitors"),
            ObjectKind::PrometheusRule => ("monitoring.coreos.com", "v1", "PrometheusRule", "prometheusrules"),
            ObjectKind::SecurityContextConstraints => (
                "security.openshift.io",
                "v1",
                "SecurityContextConstraints",
                "securitycontextconstraints",
            ),
            _ => return None,
        };
        Some(ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A managed cluster object
#[derive(Debug, Clone)]
pub enum ClusterObject {
    Namespace(Namespace),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    ConfigMap(ConfigMap),
    RuntimeClass(RuntimeClass),
    SecurityContextConstraints(DynamicObject),
    DaemonSet(DaemonSet),
    Deployment(Deployment),
    Service(Service),
    ServiceMonitor(DynamicObject),
    PrometheusRule(DynamicObject),
    Pod(Pod),
    Node(Node),
}

/// Applies `$body` to the inner object of every variant
macro_rules! each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            ClusterObject::Namespace($inner) => $body,
            ClusterObject::ServiceAccount($inner) => $body,
            ClusterObject::Role($inner) => $body,
            ClusterObject::RoleBinding($inner) => $body,
            ClusterObject::ClusterRole($inner) => $body,
            ClusterObject::ClusterRoleBinding($inner) => $body,
            ClusterObject::ConfigMap($inner) => $body,
            ClusterObject::RuntimeClass($inner) => $body,
            ClusterObject::SecurityContextConstraints($inner) => $body,
            ClusterObject::DaemonSet($inner) => $body,
            ClusterObject::Deployment($inner) => $body,
            ClusterObject::Service($inner) => $body,
            ClusterObject::ServiceMonitor($inner) => $body,
            ClusterObject::PrometheusRule($inner) => $body,
            ClusterObject::Pod($inner) => $body,
            ClusterObject::Node($inner) => $body,
        }
    };
}

impl ClusterObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ObjectKind {
        match self {
            ClusterObject::Namespace(_) => ObjectKind::Namespace,
            ClusterObject::ServiceAccount(_) => ObjectKind::ServiceAccount,
            ClusterObject::Role(_) => ObjectKind::Role,
            ClusterObject::RoleBinding(_) => ObjectKind::RoleBinding,
            ClusterObject::ClusterRole(_) => ObjectKind::ClusterRole,
            ClusterObject::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            ClusterObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ClusterObject::RuntimeClass(_) => ObjectKind::RuntimeClass,
            ClusterObject::SecurityContextConstraints(_) => ObjectKind::SecurityContextConstraints,
            ClusterObject::DaemonSet(_) => ObjectKind::DaemonSet,
            ClusterObject::Deployment(_) => ObjectKind::Deployment,
            ClusterObject::Service(_) => ObjectKind::Service,
            ClusterObject::ServiceMonitor(_) => ObjectKind::ServiceMonitor,
            ClusterObject::PrometheusRule(_) => ObjectKind::PrometheusRule,
            ClusterObject::Pod(_) => ObjectKind::Pod,
            ClusterObject::Node(_) => ObjectKind::Node,
        }
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        each_variant!(self, o => &o.metadata)
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        each_variant!(self, o => &mut o.metadata)
    }

    /// Object name (empty when unset)
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, `None` for cluster-scoped kinds
    pub fn namespace(&self) -> Option<&str> {
        if self.kind().is_namespaced() {
            self.meta().namespace.as_deref()
        } else {
            None
        }
    }

    /// `kind/namespace/name` for logs and error messages
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}/{}", self.kind(), ns, self.name()),
            None => format!("{}/{}", self.kind(), self.name()),
        }
    }

    /// Serialize the wrapped object to JSON
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        each_variant!(self, o => to_value(o))
    }

    /// Build an object from a JSON manifest, dispatching on its `kind`
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;

        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| serde_json::Error::custom("manifest is missing `kind`"))?;
        let kind = ObjectKind::from_kind(kind)
            .ok_or_else(|| serde_json::Error::custom(format!("unsupported kind `{}`", kind)))?;

        let object = match kind {
            ObjectKind::Namespace => ClusterObject::Namespace(serde_json::from_value(value)?),
            ObjectKind::ServiceAccount => ClusterObject::ServiceAccount(serde_json::from_value(value)?),
            ObjectKind::Role => ClusterObject::Role(serde_json::from_value(value)?),
            ObjectKind::RoleBinding => ClusterObject::RoleBinding(serde_json::from_value(value)?),
            ObjectKind::ClusterRole => ClusterObject::ClusterRole(serde_json::from_value(value)?),
            ObjectKind::ClusterRoleBinding => ClusterObject::ClusterRoleBinding(serde_json::from_value(value)?),
            ObjectKind::ConfigMap => ClusterObject::ConfigMap(serde_json::from_value(value)?),
            ObjectKind::RuntimeClass => ClusterObject::RuntimeClass(serde_json::from_value(value)?),
            ObjectKind::SecurityContextConstraints => {
                ClusterObject::SecurityContextConstraints(serde_json::from_value(value)?)
            }
            ObjectKind::DaemonSet => ClusterObject::DaemonSet(serde_json::from_value(value)?),
            ObjectKind::Deployment => ClusterObject::Deployment(serde_json::from_value(value)?),
            ObjectKind::Service => ClusterObject::Service(serde_json::from_value(value)?),
            ObjectKind::ServiceMonitor => ClusterObject::ServiceMonitor(serde_json::from_value(value)?),
            ObjectKind::PrometheusRule => ClusterObject::PrometheusRule(serde_json::from_value(value)?),
            ObjectKind::Pod => ClusterObject::Pod(serde_json::from_value(value)?),
            ObjectKind::Node => ClusterObject::Node(serde_json::from_value(value)?),
        };
        Ok(object)
    }
}

fn to_value<T: Serialize>(object: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(object)
}
