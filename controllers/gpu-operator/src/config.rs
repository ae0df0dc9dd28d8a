//! Operator configuration from environment variables.

use crate::component::Component;
use crate::error::ControllerError;
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Namespace operands are deployed into unless `OPERATOR_NAMESPACE` is set
pub const DEFAULT_NAMESPACE: &str = "gpu-operator";

/// Directory holding one sub-directory of templates per state
pub const DEFAULT_ASSETS_DIR: &str = "/opt/gpu-operator/manifests";

/// Runtime settings of the operator process
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Namespace operands are deployed into
    pub namespace: String,
    /// Template root directory
    pub assets_dir: PathBuf,
    /// Timeout applied to every cluster store call
    pub api_timeout: Duration,
    /// Listen address of the health/metrics server
    pub health_addr: SocketAddr,
    /// Requeue interval once the policy is fully ready
    pub ready_resync: Duration,
    /// Fallback images, used when the policy does not set coordinates
    pub fallback_images: BTreeMap<Component, String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            api_timeout: Duration::from_secs(30),
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            ready_resync: Duration::from_secs(300),
            fallback_images: BTreeMap::new(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let namespace = get("OPERATOR_NAMESPACE").unwrap_or(defaults.namespace);
        let assets_dir = get("ASSETS_DIR").map(PathBuf::from).unwrap_or(defaults.assets_dir);
        let api_timeout = match get("API_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_positive("API_TIMEOUT_SECS", &v)?),
            None => defaults.api_timeout,
        };
        let ready_resync = match get("READY_RESYNC_SECS") {
            Some(v) => Duration::from_secs(parse_positive("READY_RESYNC_SECS", &v)?),
            None => defaults.ready_resync,
        };
        let health_addr = match get("HEALTH_ADDR") {
            Some(v) => SocketAddr::from_str(&v).map_err(|e| {
                ControllerError::InvalidConfig(format!("HEALTH_ADDR '{}' is not a socket address: {}", v, e))
            })?,
            None => defaults.health_addr,
        };

        let fallback_images = Component::ALL
            .iter()
            .filter_map(|c| c.image_env().and_then(|key| get(key)).map(|image| (*c, image)))
            .collect();

        Ok(Self {
            namespace,
            assets_dir,
            api_timeout,
            health_addr,
            ready_resync,
            fallback_images,
        })
    }

    /// Fallback image for a component
    pub fn fallback_image(&self, component: Component) -> Option<&str> {
        self.fallback_images.get(&component).map(String::as_str)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ControllerError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{} must be a positive number of seconds, got '{}'",
            key, value
        ))),
    }
}
