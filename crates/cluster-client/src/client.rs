//! kube-backed cluster store
//!
//! Every call goes through `Api<DynamicObject>` with the kind's
//! `ApiResource`, converting to and from the typed `ClusterObject` via serde.

use crate::error::StoreError;
use crate::object::{ClusterObject, ObjectKind};
use crate::proxy::{ProxyConfig, CLUSTER_PROXY_NAME};
use crate::store_trait::ClusterStoreTrait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service, ServiceAccount};
use k8s_openapi::api::node::v1::RuntimeClass;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams, PostParams, TypeMeta,
};
use kube::Client;
use tracing::debug;

/// Cluster store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl std::fmt::Debug for KubeClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterStore").finish_non_exhaustive()
    }
}

impl KubeClusterStore {
    /// Create a new store from a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ObjectKind, namespace: Option<&str>) -> Result<(Api<DynamicObject>, ApiResource), StoreError> {
        let resource = api_resource(kind)?;
        let api = if kind.is_namespaced() {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
                None => Api::all_with(self.client.clone(), &resource),
            }
        } else {
            Api::all_with(self.client.clone(), &resource)
        };
        Ok((api, resource))
    }

    fn require_namespace<'a>(kind: ObjectKind, namespace: Option<&'a str>, name: &str) -> Result<Option<&'a str>, StoreError> {
        if kind.is_namespaced() && namespace.is_none() {
            return Err(StoreError::Unsupported(format!("{} {} requires a namespace", kind, name)));
        }
        Ok(namespace)
    }
}

fn api_resource(kind: ObjectKind) -> Result<ApiResource, StoreError> {
    let resource = match kind {
        ObjectKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ObjectKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        ObjectKind::Role => ApiResource::erase::<Role>(&()),
        ObjectKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
        ObjectKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
        ObjectKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
        ObjectKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ObjectKind::RuntimeClass => ApiResource::erase::<RuntimeClass>(&()),
        ObjectKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
        ObjectKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ObjectKind::Service => ApiResource::erase::<Service>(&()),
        ObjectKind::Pod => ApiResource::erase::<Pod>(&()),
        ObjectKind::Node => ApiResource::erase::<Node>(&()),
        ObjectKind::SecurityContextConstraints | ObjectKind::ServiceMonitor | ObjectKind::PrometheusRule => kind
            .dynamic_resource()
            .ok_or_else(|| StoreError::Unsupported(format!("no API resource for {}", kind)))?,
    };
    Ok(resource)
}

fn to_dynamic(object: &ClusterObject) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(object.to_value()?)?)
}

fn from_dynamic(mut object: DynamicObject, resource: &ApiResource) -> Result<ClusterObject, StoreError> {
    // List items come back without apiVersion/kind
    object.types = Some(TypeMeta {
        api_version: resource.api_version.clone(),
        kind: resource.kind.clone(),
    });
    Ok(ClusterObject::from_value(serde_json::to_value(object)?)?)
}

#[async_trait::async_trait]
impl ClusterStoreTrait for KubeClusterStore {
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError> {
        let kind = object.kind();
        let namespace = Self::require_namespace(kind, object.namespace(), object.name())?;
        let (api, resource) = self.api(kind, namespace)?;
        debug!("Creating {}", object.key());
        let created = api.create(&PostParams::default(), &to_dynamic(object)?).await?;
        from_dynamic(created, &resource)
    }

    async fn get(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<ClusterObject, StoreError> {
        let namespace = Self::require_namespace(kind, namespace, name)?;
        let (api, resource) = self.api(kind, namespace)?;
        let object = api.get(name).await?;
        from_dynamic(object, &resource)
    }

    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject, StoreError> {
        let kind = object.kind();
        let namespace = Self::require_namespace(kind, object.namespace(), object.name())?;
        let (api, resource) = self.api(kind, namespace)?;
        debug!("Replacing {} (resourceVersion {:?})", object.key(), object.meta().resource_version);
        let updated = api.replace(object.name(), &PostParams::default(), &to_dynamic(object)?).await?;
        from_dynamic(updated, &resource)
    }

    async fn delete(&self, kind: ObjectKind, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let namespace = Self::require_namespace(kind, namespace, name)?;
        let (api, _) = self.api(kind, namespace)?;
        debug!("Deleting {} {}", kind, name);
        api.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn list(&self, kind: ObjectKind, namespace: Option<&str>, label_selector: &str) -> Result<Vec<ClusterObject>, StoreError> {
        let (api, resource) = self.api(kind, namespace)?;
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        let list = api.list(&params).await?;
        list.items.into_iter().map(|item| from_dynamic(item, &resource)).collect()
    }

    async fn crd_exists(&self, name: &str) -> Result<bool, StoreError> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn get_cluster_proxy(&self) -> Result<Option<ProxyConfig>, StoreError> {
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "Proxy");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "proxies");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        match api.get_opt(CLUSTER_PROXY_NAME).await {
            Ok(proxy) => Ok(proxy.map(|p| ProxyConfig::from_object(&p.data))),
            // The Proxy API only exists on OpenShift
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_cluster_policy_status(&self, name: &str, status: serde_json::Value) -> Result<(), StoreError> {
        let gvk = GroupVersionKind::gvk("nvidia.com", "v1", "ClusterPolicy");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "clusterpolicies");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }
}
