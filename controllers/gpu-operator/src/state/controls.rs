//! Per-kind controls: how each step is written and judged.

use crate::component::Component;
use crate::error::ControllerError;
use crate::partition::DRIVER_FAMILY_LABEL;
use crate::readiness::{daemonset_ready, deployment_ready};
use crate::state::apply::{create_or_update, delete_if_exists, PassContext};
use crate::state::{Control, ReconcileResult, State, StateStep};
use crate::transform::driver::{TRUSTED_CA_CONFIGMAP, TRUSTED_CA_INJECT_LABEL};
use crate::transform::transform;
use cluster_client::{ClusterObject, ObjectKind};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// CRD backing ServiceMonitor objects
pub const SERVICE_MONITOR_CRD: &str = "servicemonitors.monitoring.coreos.com";

/// CRD backing PrometheusRule objects
pub const PROMETHEUS_RULE_CRD: &str = "prometheusrules.monitoring.coreos.com";

/// Apply every step of a state and combine their results.
///
/// A disabled component has its workloads removed instead. A write error
/// aborts the state, leaving later steps unapplied.
pub async fn apply_state(ctx: &PassContext<'_>, state: &State) -> Result<ReconcileResult, ControllerError> {
    if !state.component.is_enabled(ctx.spec) {
        remove_workloads(ctx, state).await?;
        debug!("State {} is disabled", state.name);
        return Ok(ReconcileResult::Disabled);
    }

    let mut results = Vec::with_capacity(state.steps.len());
    for step in &state.steps {
        let result = apply_step(ctx, state.component, step).await?;
        debug!("State {}: {} {} is {}", state.name, step.template.kind(), step.template.name(), result);
        results.push(result);
    }
    Ok(ReconcileResult::aggregate(results))
}

async fn apply_step(
    ctx: &PassContext<'_>,
    component: Component,
    step: &StateStep,
) -> Result<ReconcileResult, ControllerError> {
    match step.control {
        Control::Simple => apply_simple(ctx, component, step).await,
        Control::SecurityContextConstraints => {
            if !ctx.facts.openshift {
                return Ok(ReconcileResult::Ready);
            }
            apply_simple(ctx, component, step).await
        }
        Control::ServiceMonitor => apply_monitoring(ctx, component, step, SERVICE_MONITOR_CRD).await,
        Control::PrometheusRule => apply_monitoring(ctx, component, step, PROMETHEUS_RULE_CRD).await,
        Control::DaemonSet | Control::Deployment if !ctx.facts.has_gpu_nodes() => {
            debug!("No GPU nodes, skipping {} {}", step.template.kind(), step.template.name());
            if component == Component::Driver && step.control == Control::DaemonSet {
                remove_stale_variants(ctx, step.template.name(), &BTreeSet::new()).await?;
            }
            Ok(ReconcileResult::Ready)
        }
        Control::DaemonSet => apply_daemonsets(ctx, component, step).await,
        Control::Deployment => apply_deployment(ctx, component, step).await,
    }
}

async fn apply_simple(
    ctx: &PassContext<'_>,
    component: Component,
    step: &StateStep,
) -> Result<ReconcileResult, ControllerError> {
    for object in transform(component, &step.template, &ctx.transform_context())? {
        create_or_update(ctx, &object).await?;
    }
    Ok(ReconcileResult::Ready)
}

async fn apply_monitoring(
    ctx: &PassContext<'_>,
    component: Component,
    step: &StateStep,
    crd: &str,
) -> Result<ReconcileResult, ControllerError> {
    let requested = ctx.spec.dcgm_exporter.service_monitor_requested();
    if !requested {
        return Ok(ReconcileResult::Disabled);
    }
    let present = ctx.call(&format!("look up CRD {}", crd), ctx.store.crd_exists(crd)).await?;
    if !present {
        warn!("{} requested but CRD {} is not installed", step.template.kind(), crd);
        return Ok(ReconcileResult::NotReady);
    }
    apply_simple(ctx, component, step).await
}

async fn apply_daemonsets(
    ctx: &PassContext<'_>,
    component: Component,
    step: &StateStep,
) -> Result<ReconcileResult, ControllerError> {
    let objects = transform(component, &step.template, &ctx.transform_context())?;
    if component == Component::Driver {
        ensure_trusted_ca(ctx).await?;
    }

    let mut results = Vec::with_capacity(objects.len());
    for object in &objects {
        let written = create_or_update(ctx, object).await?;
        let ready = match &written {
            ClusterObject::DaemonSet(ds) => daemonset_ready(ds),
            _ => true,
        };
        results.push(if ready { ReconcileResult::Ready } else { ReconcileResult::NotReady });
    }

    if component == Component::Driver {
        let current: BTreeSet<&str> = objects.iter().map(ClusterObject::name).collect();
        remove_stale_variants(ctx, step.template.name(), &current).await?;
    }
    Ok(ReconcileResult::aggregate(results))
}

async fn apply_deployment(
    ctx: &PassContext<'_>,
    component: Component,
    step: &StateStep,
) -> Result<ReconcileResult, ControllerError> {
    let mut results = Vec::new();
    for object in transform(component, &step.template, &ctx.transform_context())? {
        let written = create_or_update(ctx, &object).await?;
        let ClusterObject::Deployment(deployment) = &written else {
            results.push(ReconcileResult::Ready);
            continue;
        };
        let selector = format!("app={}", written.name());
        let pods = ctx
            .call(
                &format!("list pods of {}", written.key()),
                ctx.store.list(ObjectKind::Pod, Some(ctx.namespace()), &selector),
            )
            .await?;
        results.push(if deployment_ready(deployment, &pods) {
            ReconcileResult::Ready
        } else {
            ReconcileResult::NotReady
        });
    }
    Ok(ReconcileResult::aggregate(results))
}

/// Create the ConfigMap OpenShift injects the cluster CA bundle into.
///
/// Its content belongs to OpenShift, so an existing one is left alone.
async fn ensure_trusted_ca(ctx: &PassContext<'_>) -> Result<(), ControllerError> {
    if ctx.facts.effective_proxy().and_then(|p| p.trusted_ca.as_ref()).is_none() {
        return Ok(());
    }

    let config_map = ClusterObject::ConfigMap(ConfigMap {
        metadata: ObjectMeta {
            name: Some(TRUSTED_CA_CONFIGMAP.to_string()),
            namespace: Some(ctx.namespace().to_string()),
            labels: Some(BTreeMap::from([(TRUSTED_CA_INJECT_LABEL.to_string(), "true".to_string())])),
            owner_references: ctx.owner.map(|o| vec![o.clone()]),
            ..Default::default()
        },
        ..Default::default()
    });
    match ctx.call("create trusted CA ConfigMap", ctx.store.create(&config_map)).await {
        Ok(_) => {
            info!("Created {}", config_map.key());
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn driver_family(ctx: &PassContext<'_>, family: &str) -> Result<Vec<String>, ControllerError> {
    let selector = format!("{}={}", DRIVER_FAMILY_LABEL, family);
    let existing = ctx
        .call(
            "list driver DaemonSets",
            ctx.store.list(ObjectKind::DaemonSet, Some(ctx.namespace()), &selector),
        )
        .await?;
    Ok(existing.iter().map(|o| o.name().to_string()).collect())
}

async fn remove_stale_variants(
    ctx: &PassContext<'_>,
    family: &str,
    current: &BTreeSet<&str>,
) -> Result<(), ControllerError> {
    for name in driver_family(ctx, family).await? {
        if !current.contains(name.as_str()) {
            info!("Removing stale driver DaemonSet {}", name);
            delete_if_exists(ctx, ObjectKind::DaemonSet, &name).await?;
        }
    }
    Ok(())
}

async fn remove_workloads(ctx: &PassContext<'_>, state: &State) -> Result<(), ControllerError> {
    for step in &state.steps {
        let kind = step.template.kind();
        if !matches!(step.control, Control::DaemonSet | Control::Deployment) {
            continue;
        }
        if state.component == Component::Driver && kind == ObjectKind::DaemonSet {
            for name in driver_family(ctx, step.template.name()).await? {
                delete_if_exists(ctx, kind, &name).await?;
            }
        }
        delete_if_exists(ctx, kind, step.template.name()).await?;
    }
    Ok(())
}
