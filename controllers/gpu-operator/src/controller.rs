//! Main controller implementation.
//!
//! Wires the cluster store, state manager and reconciler together, then runs
//! the ClusterPolicy watcher next to the health server.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::health::{self, HealthState};
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::state::manager::StateManager;
use crate::templates::{FileTemplateLoader, TemplateLoader};
use crate::watcher::watch_cluster_policies;
use cluster_client::KubeClusterStore;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns the background tasks of the operator.
pub struct Controller {
    policy_watcher: JoinHandle<Result<(), ControllerError>>,
    health_server: JoinHandle<anyhow::Result<()>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing GPU Operator");

        let kube_client = Client::try_default().await?;
        let store = Arc::new(KubeClusterStore::new(kube_client.clone()));
        let metrics = Arc::new(Metrics::new()?);

        let loader: Arc<dyn TemplateLoader> = Arc::new(FileTemplateLoader::new(config.assets_dir.clone()));
        let manager = StateManager::from_loader(loader);
        info!("States: {}", manager.state_names().await.join(", "));

        let health_addr = config.health_addr;
        let namespace = config.namespace.clone();
        let reconciler = Arc::new(Reconciler::new(store, manager, config, metrics.clone()));

        let health_state = HealthState {
            metrics,
            synced: reconciler.synced(),
        };
        let health_server = tokio::spawn(async move { health::serve(health_addr, health_state).await });

        let policy_watcher = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { watch_cluster_policies(kube_client, &namespace, reconciler).await })
        };

        Ok(Self {
            policy_watcher,
            health_server,
        })
    }

    /// Run until the watcher or the health server stops
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("GPU Operator running");

        tokio::select! {
            result = &mut self.policy_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ClusterPolicy watcher panicked: {}", e)))??;
            }
            result = &mut self.health_server => {
                result.map_err(|e| ControllerError::Health(format!("health server panicked: {}", e)))?
                    .map_err(|e| ControllerError::Health(format!("{:#}", e)))?;
            }
        }

        Ok(())
    }
}
