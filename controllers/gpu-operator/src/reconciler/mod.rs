//! ClusterPolicy reconciliation.
//!
//! One ClusterPolicy is active at a time. Each pass probes the environment,
//! walks the states from the cursor and writes the outcome back as status.

pub mod status;

#[cfg(test)]
mod reconciler_test;

use crate::backoff::FibonacciBackoff;
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::probe::probe;
use crate::state::apply::PassContext;
use crate::state::manager::{PassOutcome, StateManager};
use chrono::Utc;
use cluster_client::ClusterStoreTrait;
use crds::{ClusterPolicy, ClusterPolicySpec, ClusterPolicyStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube_runtime::reflector::{ObjectRef, Store};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, warn};

/// Requeue delays of one policy
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    not_ready_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::default(),
            not_ready_count: 0,
        }
    }

    fn reset(&mut self) {
        self.not_ready_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles ClusterPolicies into operands.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStoreTrait>,
    pub(crate) manager: StateManager,
    pub(crate) config: OperatorConfig,
    pub(crate) metrics: Arc<Metrics>,
    active_policy: Mutex<Option<String>>,
    policies: OnceLock<Store<ClusterPolicy>>,
    synced: Arc<AtomicBool>,
    /// Requeue state per policy name
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: Arc<dyn ClusterStoreTrait>,
        manager: StateManager,
        config: OperatorConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            manager,
            config,
            metrics,
            active_policy: Mutex::new(None),
            policies: OnceLock::new(),
            synced: Arc::new(AtomicBool::new(false)),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Use the watcher's cache to notice when the active policy is gone
    pub fn attach_policy_store(&self, store: Store<ClusterPolicy>) {
        if self.policies.set(store).is_err() {
            debug!("ClusterPolicy store already attached");
        }
    }

    /// Set once the first pass has completed
    pub fn synced(&self) -> Arc<AtomicBool> {
        self.synced.clone()
    }

    /// Name of the active policy
    pub fn active_policy(&self) -> Option<String> {
        self.active_policy.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn policy_exists(&self, name: &str) -> bool {
        match self.policies.get() {
            Some(store) => store.get(&ObjectRef::new(name)).is_some(),
            None => true,
        }
    }

    /// Claim the active slot for `name`. Returns the active policy when it is another one.
    fn claim(&self, name: &str) -> Option<String> {
        let mut active = self.active_policy.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_deref() {
            Some(current) if current == name => None,
            Some(current) if self.policy_exists(current) => Some(current.to_string()),
            Some(current) => {
                info!("Active ClusterPolicy {} is gone, {} takes over", current, name);
                *active = Some(name.to_string());
                None
            }
            None => {
                info!("ClusterPolicy {} is now active", name);
                *active = Some(name.to_string());
                None
            }
        }
    }

    /// Reconcile one ClusterPolicy
    pub async fn reconcile_policy(&self, policy: &ClusterPolicy) -> Result<Action, ControllerError> {
        let name = policy.name_any();

        if let Some(active) = self.claim(&name) {
            info!("Ignoring ClusterPolicy {}, {} is active", name, active);
            self.metrics.record_pass("ignored");
            let status = status::ignored_status(&active, &self.config.namespace, policy.status.as_ref(), Utc::now());
            self.write_status(&name, policy.status.as_ref(), &status).await?;
            return Ok(Action::await_change());
        }

        let owner = policy.controller_owner_ref(&());
        let outcome = self.run_pass(&policy.spec, owner.as_ref(), policy.metadata.generation).await;
        self.metrics.record_pass(match (&outcome.error, outcome.ready) {
            (Some(_), _) => "error",
            (None, true) => "ready",
            (None, false) => "not_ready",
        });

        let status = status::policy_status(&outcome, &self.config.namespace, policy.status.as_ref(), Utc::now());
        self.write_status(&name, policy.status.as_ref(), &status).await?;
        self.synced.store(true, Ordering::Relaxed);

        Ok(self.requeue(&name, outcome.ready))
    }

    /// Probe the environment and walk the states once
    pub async fn run_pass(
        &self,
        spec: &ClusterPolicySpec,
        owner: Option<&OwnerReference>,
        generation: Option<i64>,
    ) -> PassOutcome {
        let facts = match probe(self.store.as_ref(), self.config.api_timeout).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Environment probe failed: {}", e);
                return PassOutcome {
                    ready: false,
                    state: self.manager.current_state_name().await,
                    error: Some(e),
                    results: Vec::new(),
                };
            }
        };
        self.metrics.set_gpu_nodes(facts.nodes.len());

        let ctx = PassContext {
            store: self.store.as_ref(),
            spec,
            facts: &facts,
            config: &self.config,
            owner,
        };
        let outcome = self.manager.reconcile(&ctx, generation).await;
        for (state, result) in &outcome.results {
            self.metrics.record_state(state, *result);
        }
        outcome
    }

    async fn write_status(
        &self,
        name: &str,
        previous: Option<&ClusterPolicyStatus>,
        status: &ClusterPolicyStatus,
    ) -> Result<(), ControllerError> {
        // Every status write is a watch event, so unchanged status is not written
        if previous == Some(status) {
            return Ok(());
        }
        let value = serde_json::to_value(status)?;
        let call = self.store.patch_cluster_policy_status(name, value);
        crate::probe::bounded(self.config.api_timeout, "patch ClusterPolicy status", call).await?;
        debug!("Updated status of ClusterPolicy {} to {}", name, status.state.as_str());
        Ok(())
    }

    fn requeue(&self, name: &str, ready: bool) -> Action {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(name.to_string()).or_insert_with(BackoffState::new);
        if ready {
            state.reset();
            return Action::requeue(self.config.ready_resync);
        }
        state.not_ready_count += 1;
        let delay = state.backoff.next_backoff();
        debug!(
            "ClusterPolicy {} not ready ({} passes), requeue in {:?}",
            name, state.not_ready_count, delay
        );
        Action::requeue(delay)
    }

    /// Requeue delay after a failed reconcile
    pub fn error_requeue(&self, name: &str) -> Action {
        self.requeue(name, false)
    }
}
