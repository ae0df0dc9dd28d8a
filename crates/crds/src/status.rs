//! ClusterPolicy status types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reported when every state is Ready or Disabled
pub const CONDITION_READY: &str = "Ready";

/// Condition type reported while a state is blocked by an error
pub const CONDITION_ERROR: &str = "Error";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicyStatus {
    /// Overall policy state
    #[serde(default)]
    pub state: PolicyState,

    /// Namespace the operands are deployed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Reconciliation conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PolicyCondition>,
}

/// Overall ClusterPolicy state
///
/// Serialized camelCase ("ready", "notReady", "ignored").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PolicyState {
    /// At least one state is still converging
    #[default]
    NotReady,

    /// Every state is Ready or Disabled
    Ready,

    /// Another ClusterPolicy is active; this one is not reconciled
    Ignored,
}

impl PolicyState {
    /// Serialized form of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyState::NotReady => "notReady",
            PolicyState::Ready => "ready",
            PolicyState::Ignored => "ignored",
        }
    }
}

/// Status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCondition {
    /// Condition type ("Ready" or "Error")
    #[serde(rename = "type")]
    pub type_: String,

    /// "True" or "False"
    pub status: String,

    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message, including the blocking state name
    #[serde(default)]
    pub message: String,

    /// Last time the condition changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}
