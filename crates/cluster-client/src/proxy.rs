//! Cluster-wide proxy configuration
//!
//! OpenShift exposes a singleton `Proxy` object (config.openshift.io/v1,
//! name `cluster`). Only the fields consumed by operands are kept.

use serde::{Deserialize, Serialize};

/// Name of the cluster-wide proxy object
pub const CLUSTER_PROXY_NAME: &str = "cluster";

/// Outbound proxy settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP proxy URL
    pub http_proxy: Option<String>,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Comma-separated exclusions
    pub no_proxy: Option<String>,
    /// ConfigMap (in openshift-config) holding a custom CA bundle
    pub trusted_ca: Option<String>,
}

impl ProxyConfig {
    /// Parse the `spec` of a Proxy object. Empty strings count as unset.
    ///
    /// The observed `status` carries the effective values; it takes
    /// precedence over `spec` when present.
    pub fn from_object(data: &serde_json::Value) -> Self {
        let field = |section: &str, name: &str| {
            data.get(section)
                .and_then(|s| s.get(name))
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let effective = |name: &str| field("status", name).or_else(|| field("spec", name));

        let trusted_ca = data
            .pointer("/spec/trustedCA/name")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            http_proxy: effective("httpProxy"),
            https_proxy: effective("httpsProxy"),
            no_proxy: effective("noProxy"),
            trusted_ca,
        }
    }

    /// True when no proxy setting is configured at all
    pub fn is_empty(&self) -> bool {
        self.http_proxy.is_none() && self.https_proxy.is_none() && self.no_proxy.is_none() && self.trusted_ca.is_none()
    }
}
