//! ClusterStoreTrait for mocking
//!
//! This trait abstracts the Kubernetes API surface used by the operator so
//! the reconciliation loop can be exercised against an in-memory store.

use crate::error::StoreError;
use crate::object::{ClusterObject, ObjectKind};
use crate::proxy::ProxyConfig;

/// Trait for cluster store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterStoreTrait: Send + Sync {
    /// Create an object. Fails with `AlreadyExists` when it is present.
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError>;

    /// Fetch an object by kind, namespace and name.
    async fn get(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<ClusterObject, StoreError>;

    /// Replace an object. The object must carry the observed resource version.
    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError>;

    /// Delete an object. Fails with `NotFound` when it is absent.
    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<(), StoreError>;

    /// List objects of a kind matching a label selector (`k=v,k2=v2`, empty for all).
    async fn list(&self, kind: ObjectKind, namespace: Option<&str>, label_selector: &str) -> Result<Vec<ClusterObject>, StoreError>;

    /// Whether a CustomResourceDefinition with this name is installed.
    async fn crd_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// The cluster-wide proxy configuration, `None` when the cluster has none.
    async fn get_cluster_proxy(&self) -> Result<Option<ProxyConfig>, StoreError>;

    /// Merge-patch the status subresource of a ClusterPolicy.
    async fn patch_cluster_policy_status(&self, name: &str, status: serde_json::Value) -> Result<(), StoreError>;
}
