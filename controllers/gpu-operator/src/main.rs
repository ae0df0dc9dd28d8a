//! GPU Operator
//!
//! Reconciles the cluster-wide `ClusterPolicy` into the operands that make
//! GPUs usable on Kubernetes nodes:
//! - Driver (one DaemonSet per OS/kernel variant when precompiled)
//! - Container toolkit, device plugin and validator
//! - DCGM, DCGM exporter, GPU feature discovery and MIG manager
//!
//! States are applied in order and the walk stops at the first one that is
//! not ready yet.

mod backoff;
mod component;
mod config;
mod controller;
mod error;
mod health;
mod metrics;
mod partition;
mod probe;
mod readiness;
mod reconciler;
mod state;
mod templates;
mod transform;
mod watcher;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod partition_test;
#[cfg(test)]
mod readiness_test;
#[cfg(test)]
mod templates_test;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        return Err(ControllerError::InvalidConfig(format!(
            "cannot install the rustls crypto provider: {:?}",
            e
        )));
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting GPU Operator");

    let config = OperatorConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Assets: {}", config.assets_dir.display());
    info!("  API timeout: {:?}", config.api_timeout);
    info!("  Health address: {}", config.health_addr);
    for (component, image) in &config.fallback_images {
        info!("  Fallback image for {}: {}", component, image);
    }

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
