//! Cluster store errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Create rejected because the object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Update rejected because the resource version is stale
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object rejected by validation (e.g., immutable field changed)
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// Object cannot be handled by this store (e.g., missing namespace)
    #[error("Unsupported object: {0}")]
    Unsupported(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for "already exists" create failures
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// Returns true for not-found errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 422 => StoreError::Invalid(ae.message.clone()),
            other => StoreError::Kube(other),
        }
    }
}
