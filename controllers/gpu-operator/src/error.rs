//! Controller-specific error types.
//!
//! Errors the GPU operator raises on top of the Kubernetes and cluster
//! store errors it wraps.

use cluster_client::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the GPU Operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster store error
    #[error("Cluster store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration (bad image coordinates, unsupported OS, bad env)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Node discovery labels required by the operator are missing
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// Template does not match what its transform expects
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// Templates for a state could not be read or parsed
    #[error("Failed to load templates: {0}")]
    TemplateLoad(String),

    /// A cluster store call did not finish in time
    #[error("Timed out after {0:?}: {1}")]
    Timeout(std::time::Duration, String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Health server stopped
    #[error("Health server failed: {0}")]
    Health(String),
}

impl ControllerError {
    /// Whether this is an "already exists" create failure from the store
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_already_exists())
    }

    /// Whether this is a not-found failure from the store
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_not_found())
    }

    /// Short machine-readable reason used in status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) | ControllerError::Store(_) => "ClusterStoreError",
            ControllerError::InvalidConfig(_) => "InvalidConfiguration",
            ControllerError::PrerequisiteMissing(_) => "PrerequisiteMissing",
            ControllerError::InvalidTemplate(_) | ControllerError::TemplateLoad(_) => "TemplateError",
            ControllerError::Timeout(..) => "Timeout",
            ControllerError::Watch(_) => "WatchError",
            ControllerError::Serialization(_) => "SerializationError",
            ControllerError::Metrics(_) | ControllerError::Health(_) => "OperatorError",
        }
    }
}
