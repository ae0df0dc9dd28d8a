//! ClusterPolicy watcher.
//!
//! Runs a `kube_runtime::Controller` over ClusterPolicies that also owns the
//! operand DaemonSets and Deployments, so a rollout finishing on a node
//! triggers the next pass.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::ClusterPolicy;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

async fn reconcile(policy: Arc<ClusterPolicy>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    debug!("Reconciling ClusterPolicy {}", policy.name_any());
    reconciler.reconcile_policy(&policy).await
}

fn error_policy(policy: Arc<ClusterPolicy>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let name = policy.name_any();
    error!("Reconciliation error for ClusterPolicy {}: {}", name, error);
    reconciler.error_requeue(&name)
}

/// Watch ClusterPolicies and their operands until the watch stream ends
pub async fn watch_cluster_policies(
    client: Client,
    namespace: &str,
    reconciler: Arc<Reconciler>,
) -> Result<(), ControllerError> {
    info!("Starting ClusterPolicy watcher (operands in {})", namespace);

    let policies: Api<ClusterPolicy> = Api::all(client.clone());
    let daemonsets: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let deployments: Api<Deployment> = Api::namespaced(client, namespace);

    // Passes are single-flight in the state manager, so one worker is enough
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(1);

    let controller = Controller::new(policies, watcher::Config::default())
        .owns(daemonsets, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .with_config(controller_config);
    reconciler.attach_policy_store(controller.store());

    controller
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((policy, _)) => debug!("Reconciled ClusterPolicy {}", policy.name),
                Err(e) => error!("ClusterPolicy controller error: {}", e),
            }
        })
        .await;

    Err(ControllerError::Watch("ClusterPolicy watch stream ended".to_string()))
}
