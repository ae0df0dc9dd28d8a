//! Mock cluster store for unit testing
//!
//! Keeps objects in memory and mimics the API server behaviors the operator
//! depends on:
//! - create of an existing object fails with `AlreadyExists`
//! - update requires the stored `resourceVersion` (when one is sent)
//! - a Service's `clusterIP` is immutable once allocated
//! - status written by controllers survives spec updates
//!
//! Writes can be made to fail per object, and every call can be delayed to
//! exercise timeouts.
//!
//! - `fixtures.rs` - builders for nodes, pods and workload status

mod fixtures;

pub use fixtures::*;

use crate::error::StoreError;
use crate::object::{ClusterObject, ObjectKind};
use crate::proxy::ProxyConfig;
use crate::selector::LabelSelector;
use crate::store_trait::ClusterStoreTrait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus, Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type ObjectKey = (ObjectKind, Option<String>, String);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key_of(kind: ObjectKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if kind.is_namespaced() { namespace.map(str::to_string) } else { None };
    (kind, namespace, name.to_string())
}

/// Mock cluster store for testing
#[derive(Debug, Clone, Default)]
pub struct MockClusterStore {
    pub(crate) objects: Arc<Mutex<BTreeMap<ObjectKey, ClusterObject>>>,
    pub(crate) crds: Arc<Mutex<HashSet<String>>>,
    pub(crate) proxy: Arc<Mutex<Option<ProxyConfig>>>,
    pub(crate) write_failures: Arc<Mutex<HashMap<(ObjectKind, String), String>>>,
    pub(crate) latency: Arc<Mutex<Option<Duration>>>,
    pub(crate) policy_statuses: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    // Counters for assertions
    pub(crate) next_id: Arc<AtomicU64>,
    pub(crate) creates: Arc<AtomicUsize>,
    pub(crate) updates: Arc<AtomicUsize>,
    pub(crate) deletes: Arc<AtomicUsize>,
}

impl MockClusterStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object as-is, bypassing create semantics (for test setup)
    pub fn add_object(&self, mut object: ClusterObject) {
        if object.meta().resource_version.is_none() {
            object.meta_mut().resource_version = Some("1".to_string());
        }
        let key = key_of(object.kind(), object.namespace(), object.name());
        lock(&self.objects).insert(key, object);
    }

    /// Register an installed CustomResourceDefinition by name
    pub fn add_crd(&self, name: impl Into<String>) {
        lock(&self.crds).insert(name.into());
    }

    /// Set the cluster-wide proxy configuration
    pub fn set_proxy(&self, proxy: ProxyConfig) {
        *lock(&self.proxy) = Some(proxy);
    }

    /// Make every create/update/delete of `kind/name` fail with `message`
    pub fn fail_writes_for(&self, kind: ObjectKind, name: impl Into<String>, message: impl Into<String>) {
        lock(&self.write_failures).insert((kind, name.into()), message.into());
    }

    /// Stop failing writes for `kind/name`
    pub fn clear_write_failure(&self, kind: ObjectKind, name: &str) {
        lock(&self.write_failures).remove(&(kind, name.to_string()));
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Overwrite the observed status of a stored DaemonSet
    pub fn set_daemonset_status(&self, namespace: &str, name: &str, status: DaemonSetStatus) -> bool {
        let key = key_of(ObjectKind::DaemonSet, Some(namespace), name);
        match lock(&self.objects).get_mut(&key) {
            Some(ClusterObject::DaemonSet(ds)) => {
                ds.status = Some(status);
                true
            }
            _ => false,
        }
    }

    /// Overwrite the observed status of a stored Deployment
    pub fn set_deployment_status(&self, namespace: &str, name: &str, status: DeploymentStatus) -> bool {
        let key = key_of(ObjectKind::Deployment, Some(namespace), name);
        match lock(&self.objects).get_mut(&key) {
            Some(ClusterObject::Deployment(deploy)) => {
                deploy.status = Some(status);
                true
            }
            _ => false,
        }
    }

    /// Look up a stored object
    pub fn get_object(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Option<ClusterObject> {
        lock(&self.objects).get(&key_of(kind, namespace, name)).cloned()
    }

    /// All stored objects of one kind, ordered by namespace and name
    pub fn objects_of(&self, kind: ObjectKind) -> Vec<ClusterObject> {
        lock(&self.objects)
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Stored DaemonSet by name
    pub fn daemonset(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        match self.get_object(ObjectKind::DaemonSet, Some(namespace), name) {
            Some(ClusterObject::DaemonSet(ds)) => Some(ds),
            _ => None,
        }
    }

    /// Stored Deployment by name
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        match self.get_object(ObjectKind::Deployment, Some(namespace), name) {
            Some(ClusterObject::Deployment(deploy)) => Some(deploy),
            _ => None,
        }
    }

    /// Stored Service by name
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        match self.get_object(ObjectKind::Service, Some(namespace), name) {
            Some(ClusterObject::Service(svc)) => Some(svc),
            _ => None,
        }
    }

    /// Stored ConfigMap by name
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        match self.get_object(ObjectKind::ConfigMap, Some(namespace), name) {
            Some(ClusterObject::ConfigMap(cm)) => Some(cm),
            _ => None,
        }
    }

    /// Last status patched onto a ClusterPolicy
    pub fn policy_status(&self, name: &str) -> Option<serde_json::Value> {
        lock(&self.policy_statuses).get(name).cloned()
    }

    /// Number of successful creates
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful updates
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of successful deletes
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_write(&self, kind: ObjectKind, name: &str) -> Result<(), StoreError> {
        match lock(&self.write_failures).get(&(kind, name.to_string())) {
            Some(message) => Err(StoreError::Invalid(message.clone())),
            None => Ok(()),
        }
    }

    fn require_namespace(object: &ClusterObject) -> Result<(), StoreError> {
        if object.kind().is_namespaced() && object.namespace().is_none() {
            return Err(StoreError::Unsupported(format!("{} requires a namespace", object.key())));
        }
        Ok(())
    }
}

/// Server-side defaults applied on create
fn apply_create_defaults(object: &mut ClusterObject, id: u64) {
    let meta = object.meta_mut();
    meta.resource_version = Some("1".to_string());
    meta.uid = Some(format!("mock-uid-{}", id));

    match object {
        ClusterObject::Service(svc) => {
            let spec = svc.spec.get_or_insert_with(Default::default);
            if spec.cluster_ip.is_none() {
                let ip = format!("10.96.0.{}", id % 250 + 1);
                spec.cluster_ip = Some(ip.clone());
                spec.cluster_ips = Some(vec![ip]);
            }
        }
        // Status is owned by the workload controllers, never by the client
        ClusterObject::DaemonSet(ds) => ds.status = None,
        ClusterObject::Deployment(deploy) => deploy.status = None,
        _ => {}
    }
}

/// Reject updates that change an allocated Service IP
fn validate_update(stored: &ClusterObject, updated: &ClusterObject) -> Result<(), StoreError> {
    if let (ClusterObject::Service(old), ClusterObject::Service(new)) = (stored, updated) {
        let old_ip = old.spec.as_ref().and_then(|s| s.cluster_ip.as_deref());
        let new_ip = new.spec.as_ref().and_then(|s| s.cluster_ip.as_deref());
        if old_ip.is_some() && old_ip != new_ip {
            return Err(StoreError::Invalid(format!(
                "Service {}: spec.clusterIP is immutable ({:?} -> {:?})",
                updated.name(),
                old_ip,
                new_ip
            )));
        }
    }
    Ok(())
}

/// Carry observed status over a spec update
fn preserve_status(stored: &ClusterObject, updated: &mut ClusterObject) {
    match (stored, updated) {
        (ClusterObject::DaemonSet(old), ClusterObject::DaemonSet(new)) => new.status = old.status.clone(),
        (ClusterObject::Deployment(old), ClusterObject::Deployment(new)) => new.status = old.status.clone(),
        (ClusterObject::Pod(old), ClusterObject::Pod(new)) => new.status = old.status.clone(),
        (ClusterObject::Node(old), ClusterObject::Node(new)) => new.status = old.status.clone(),
        _ => {}
    }
}

#[async_trait::async_trait]
impl ClusterStoreTrait for MockClusterStore {
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError> {
        self.simulate_latency().await;
        Self::require_namespace(object)?;
        self.check_write(object.kind(), object.name())?;

        let key = key_of(object.kind(), object.namespace(), object.name());
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(object.key()));
        }
        let mut created = object.clone();
        apply_create_defaults(&mut created, self.next_id());
        objects.insert(key, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn get(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<ClusterObject, StoreError> {
        self.simulate_latency().await;
        lock(&self.objects)
            .get(&key_of(kind, namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", kind, name)))
    }

    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError> {
        self.simulate_latency().await;
        Self::require_namespace(object)?;
        self.check_write(object.kind(), object.name())?;

        let key = key_of(object.kind(), object.namespace(), object.name());
        let mut objects = lock(&self.objects);
        let stored = objects.get(&key).ok_or_else(|| StoreError::NotFound(object.key()))?;

        let stored_version = stored.meta().resource_version.clone();
        if let Some(sent) = object.meta().resource_version.as_ref() {
            if Some(sent) != stored_version.as_ref() {
                return Err(StoreError::Conflict(format!(
                    "{}: resourceVersion {} does not match {:?}",
                    object.key(),
                    sent,
                    stored_version
                )));
            }
        }
        validate_update(stored, object)?;

        let mut updated = object.clone();
        preserve_status(stored, &mut updated);
        let next_version = stored_version.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0) + 1;
        let meta = updated.meta_mut();
        meta.resource_version = Some(next_version.to_string());
        meta.uid = stored.meta().uid.clone();

        objects.insert(key, updated.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        self.check_write(kind, name)?;
        match lock(&self.objects).remove(&key_of(kind, namespace, name)) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("{} {}", kind, name))),
        }
    }

    async fn list(&self, kind: ObjectKind, namespace: Option<&str>, label_selector: &str) -> Result<Vec<ClusterObject>, StoreError> {
        self.simulate_latency().await;
        let selector = LabelSelector::parse(label_selector);
        let items = lock(&self.objects)
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (namespace.is_none() || ns.as_deref() == namespace))
            .filter(|(_, o)| selector.matches(o.meta().labels.as_ref()))
            .map(|(_, o)| o.clone())
            .collect();
        Ok(items)
    }

    async fn crd_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        Ok(lock(&self.crds).contains(name))
    }

    async fn get_cluster_proxy(&self) -> Result<Option<ProxyConfig>, StoreError> {
        self.simulate_latency().await;
        Ok(lock(&self.proxy).clone())
    }

    async fn patch_cluster_policy_status(&self, name: &str, status: serde_json::Value) -> Result<(), StoreError> {
        self.simulate_latency().await;
        lock(&self.policy_statuses).insert(name.to_string(), status);
        Ok(())
    }
}
