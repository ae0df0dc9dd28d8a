//! Per-pass context and idempotent writes.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::probe::{bounded, EnvironmentFacts};
use crate::transform::TransformContext;
use cluster_client::{ClusterObject, ClusterStoreTrait, ObjectKind, StoreError};
use crds::ClusterPolicySpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::future::Future;
use tracing::{debug, info};

/// Inputs shared by every step of one reconciliation pass
pub struct PassContext<'a> {
    /// Cluster store
    pub store: &'a dyn ClusterStoreTrait,
    /// Desired state, read at the start of the pass
    pub spec: &'a ClusterPolicySpec,
    /// Environment facts, probed at the start of the pass
    pub facts: &'a EnvironmentFacts,
    /// Operator settings
    pub config: &'a OperatorConfig,
    /// Controller reference to the active ClusterPolicy
    pub owner: Option<&'a OwnerReference>,
}

impl std::fmt::Debug for PassContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("namespace", &self.config.namespace)
            .field("facts", &self.facts)
            .finish_non_exhaustive()
    }
}

impl<'a> PassContext<'a> {
    /// Operand namespace
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Run a store call bounded by the configured timeout
    pub async fn call<T, F>(&self, what: &str, call: F) -> Result<T, ControllerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        bounded(self.config.api_timeout, what, call).await
    }

    /// Inputs for the pure transforms
    pub fn transform_context(&self) -> TransformContext<'a> {
        TransformContext {
            spec: self.spec,
            facts: self.facts,
            config: self.config,
            owner: self.owner,
        }
    }
}

/// Create `object`, or bring the existing object in line with it.
///
/// Kinds that are created once count as done when they already exist.
/// Everything else is fetched, has its server-assigned fields carried
/// forward, and is replaced.
pub async fn create_or_update(ctx: &PassContext<'_>, object: &ClusterObject) -> Result<ClusterObject, ControllerError> {
    let key = object.key();
    match ctx.call(&format!("create {}", key), ctx.store.create(object)).await {
        Ok(created) => {
            info!("Created {}", key);
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            if object.kind().is_create_only() {
                debug!("{} already exists", key);
                return Ok(object.clone());
            }
            let existing = ctx
                .call(&format!("get {}", key), ctx.store.get(object.kind(), object.namespace(), object.name()))
                .await?;
            let mut desired = object.clone();
            carry_forward(&existing, &mut desired);
            let updated = ctx.call(&format!("update {}", key), ctx.store.update(&desired)).await?;
            debug!("Updated {}", key);
            Ok(updated)
        }
        Err(e) => Err(e),
    }
}

/// Copy server-assigned fields from the observed object into an update
pub fn carry_forward(existing: &ClusterObject, desired: &mut ClusterObject) {
    desired.meta_mut().resource_version = existing.meta().resource_version.clone();

    if let (ClusterObject::Service(observed), ClusterObject::Service(service)) = (existing, &mut *desired) {
        if let (Some(observed), Some(spec)) = (observed.spec.as_ref(), service.spec.as_mut()) {
            spec.cluster_ip = observed.cluster_ip.clone();
            spec.cluster_ips = observed.cluster_ips.clone();
        }
    }
}

/// Delete an object, treating "not found" as done. Returns whether it existed.
pub async fn delete_if_exists(
    ctx: &PassContext<'_>,
    kind: ObjectKind,
    name: &str,
) -> Result<bool, ControllerError> {
    let namespace = kind.is_namespaced().then(|| ctx.namespace());
    match ctx.call(&format!("delete {} {}", kind, name), ctx.store.delete(kind, namespace, name)).await {
        Ok(()) => {
            info!("Deleted {} {}", kind, name);
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
