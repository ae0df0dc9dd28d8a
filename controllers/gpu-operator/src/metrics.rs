//! Prometheus metrics of the reconcile loop.

use crate::state::ReconcileResult;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Operator metrics, registered on a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    state_ready: IntGaugeVec,
    state_disabled: IntGaugeVec,
    gpu_nodes: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").field("gpu_nodes", &self.gpu_nodes.get()).finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register every metric
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconciliations = IntCounterVec::new(
            Opts::new("gpu_operator_reconciliations_total", "ClusterPolicy passes by outcome"),
            &["result"],
        )?;
        let state_ready = IntGaugeVec::new(
            Opts::new("gpu_operator_state_ready", "1 when the state was Ready on its last step"),
            &["state"],
        )?;
        let state_disabled = IntGaugeVec::new(
            Opts::new("gpu_operator_state_disabled", "1 when the state was Disabled on its last step"),
            &["state"],
        )?;
        let gpu_nodes = IntGauge::new("gpu_operator_gpu_nodes", "GPU nodes seen by the last probe")?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(state_ready.clone()))?;
        registry.register(Box::new(state_disabled.clone()))?;
        registry.register(Box::new(gpu_nodes.clone()))?;
        Ok(Self {
            registry,
            reconciliations,
            state_ready,
            state_disabled,
            gpu_nodes,
        })
    }

    /// Count a pass ("ready", "not_ready", "error" or "ignored")
    pub fn record_pass(&self, result: &str) {
        self.reconciliations.with_label_values(&[result]).inc();
    }

    /// Record the last result of a state
    pub fn record_state(&self, state: &str, result: ReconcileResult) {
        self.state_ready
            .with_label_values(&[state])
            .set(i64::from(result == ReconcileResult::Ready));
        self.state_disabled
            .with_label_values(&[state])
            .set(i64::from(result == ReconcileResult::Disabled));
    }

    /// Record the probed GPU node count
    pub fn set_gpu_nodes(&self, count: usize) {
        self.gpu_nodes.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render every metric in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
