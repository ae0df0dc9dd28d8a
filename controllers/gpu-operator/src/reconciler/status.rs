//! ClusterPolicy status built from a pass outcome.

use crate::state::manager::PassOutcome;
use chrono::{DateTime, Utc};
use crds::{ClusterPolicyStatus, PolicyCondition, PolicyState, CONDITION_ERROR, CONDITION_READY};

fn condition(type_: &str, status: bool, reason: &str, message: String) -> PolicyCondition {
    PolicyCondition {
        type_: type_.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time: None,
    }
}

/// Status of the active policy after a pass
pub fn policy_status(
    outcome: &PassOutcome,
    namespace: &str,
    previous: Option<&ClusterPolicyStatus>,
    now: DateTime<Utc>,
) -> ClusterPolicyStatus {
    let state_name = outcome.state.as_deref().unwrap_or("environment probe");
    let (state, conditions) = if outcome.ready {
        (
            PolicyState::Ready,
            vec![
                condition(CONDITION_READY, true, "Reconciled", "All states are ready".to_string()),
                condition(CONDITION_ERROR, false, "Ready", String::new()),
            ],
        )
    } else if let Some(error) = &outcome.error {
        (
            PolicyState::NotReady,
            vec![
                condition(
                    CONDITION_READY,
                    false,
                    "ReconcileFailed",
                    format!("state {} failed", state_name),
                ),
                condition(CONDITION_ERROR, true, error.reason(), format!("state {}: {}", state_name, error)),
            ],
        )
    } else {
        (
            PolicyState::NotReady,
            vec![
                condition(
                    CONDITION_READY,
                    false,
                    "OperandNotReady",
                    format!("state {} is not ready", state_name),
                ),
                condition(CONDITION_ERROR, false, "OperandNotReady", String::new()),
            ],
        )
    };

    ClusterPolicyStatus {
        state,
        namespace: Some(namespace.to_string()),
        conditions: stamp(conditions, previous, now),
    }
}

/// Status of a policy shadowed by the active one
pub fn ignored_status(
    active: &str,
    namespace: &str,
    previous: Option<&ClusterPolicyStatus>,
    now: DateTime<Utc>,
) -> ClusterPolicyStatus {
    let conditions = vec![
        condition(
            CONDITION_READY,
            false,
            "Ignored",
            format!("ClusterPolicy {} is already active", active),
        ),
        condition(CONDITION_ERROR, false, "Ignored", String::new()),
    ];
    ClusterPolicyStatus {
        state: PolicyState::Ignored,
        namespace: Some(namespace.to_string()),
        conditions: stamp(conditions, previous, now),
    }
}

// Transition times only move when a condition flips
fn stamp(
    mut conditions: Vec<PolicyCondition>,
    previous: Option<&ClusterPolicyStatus>,
    now: DateTime<Utc>,
) -> Vec<PolicyCondition> {
    for condition in &mut conditions {
        let carried = previous
            .and_then(|p| p.conditions.iter().find(|c| c.type_ == condition.type_))
            .filter(|c| c.status == condition.status)
            .and_then(|c| c.last_transition_time);
        condition.last_transition_time = Some(carried.unwrap_or(now));
    }
    conditions
}
