//! Shared component spec types
//!
//! Every operand sub-spec of the ClusterPolicy flattens a `ComponentSpec`
//! carrying its image coordinates and scheduling overrides.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced when composing an image reference from a component spec
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImagePathError {
    /// Repository, image and version were only partially provided
    #[error("incomplete image coordinates (repository={repository:?}, image={image:?}, version={version:?})")]
    Incomplete {
        /// Configured repository
        repository: Option<String>,
        /// Configured image name
        image: Option<String>,
        /// Configured version or digest
        version: Option<String>,
    },
}

/// Image coordinates and scheduling overrides for one operand
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Image registry/repository (e.g., "nvcr.io/nvidia")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Image name (e.g., "driver")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image tag or content digest (e.g., "550.54.15" or "sha256:...")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Names of image pull secrets in the operator namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<String>,

    /// Replacement arguments for the main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment variables for the main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,

    /// Resource requirements for the main container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,

    /// Node selector for the operand pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Pod affinity (core/v1 Affinity, passed through verbatim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub affinity: Option<serde_json::Value>,

    /// Tolerations for the operand pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<TolerationSpec>>,

    /// Priority class for the operand pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
}

impl ComponentSpec {
    /// Returns true when the version field is a content digest
    pub fn is_digest(&self) -> bool {
        self.version.as_deref().is_some_and(is_digest)
    }

    /// Compose the image reference from the configured coordinates.
    ///
    /// - `repository/image:version[-suffix]` when all three are set
    /// - `repository/image@digest` when the version is a digest (suffix ignored)
    /// - `image` verbatim when only the image is set (full path)
    /// - `None` when nothing is set, so callers can fall back to a default
    pub fn image_path(&self, suffix: Option<&str>) -> Result<Option<String>, ImagePathError> {
        let repository = non_empty(self.repository.as_deref());
        let image = non_empty(self.image.as_deref());
        let version = non_empty(self.version.as_deref());

        match (repository, image, version) {
            (None, None, None) => Ok(None),
            (None, Some(image), None) => Ok(Some(image.to_string())),
            (Some(repository), Some(image), Some(version)) => {
                let repository = repository.trim_end_matches('/');
                if is_digest(version) {
                    Ok(Some(format!("{}/{}@{}", repository, image, version)))
                } else {
                    match suffix {
                        Some(suffix) => Ok(Some(format!("{}/{}:{}-{}", repository, image, version, suffix))),
                        None => Ok(Some(format!("{}/{}:{}", repository, image, version))),
                    }
                }
            }
            _ => Err(ImagePathError::Incomplete {
                repository: self.repository.clone(),
                image: self.image.clone(),
                version: self.version.clone(),
            }),
        }
    }
}

/// Returns true for `algo:hex` content digests
pub fn is_digest(version: &str) -> bool {
    version.starts_with("sha256:") || version.starts_with("sha512:")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Name/value environment variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    /// Variable name
    pub name: String,

    /// Variable value
    #[serde(default)]
    pub value: String,
}

impl EnvVarSpec {
    /// Create a new env var
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Resource limits and requests (quantities as strings, e.g. "500m", "1Gi")
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// Resource limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    /// Resource requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Pod toleration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TolerationSpec {
    /// Taint key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Operator (Exists, Equal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Taint value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Taint effect (NoSchedule, PreferNoSchedule, NoExecute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    /// Toleration period for NoExecute taints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Reference to a ConfigMap in the operator namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReference {
    /// ConfigMap name
    pub name: String,
}
