//! Kernel partitioning of the driver workload.
//!
//! Precompiled driver images are built per kernel, so the driver DaemonSet
//! is fanned out into one variant per distinct kernel in the fleet. Without
//! precompiled images a single driver DaemonSet builds modules on each node.

use crate::component::Component;
use crate::error::ControllerError;
use crate::probe::{EnvironmentFacts, NodeFact};
use crate::transform::common::resolve_image;
use crds::DriverSpec;
use std::collections::{BTreeMap, BTreeSet};

/// Label tying every driver variant to its template, for stale cleanup
pub const DRIVER_FAMILY_LABEL: &str = "nvidia.com/gpu-operator.driver-family";

/// Label carrying the (sanitized) kernel a precompiled variant is pinned to
pub const DRIVER_KERNEL_LABEL: &str = "nvidia.com/gpu-operator.driver-kernel";

const MAX_NAME_LEN: usize = 63;

/// GPU nodes sharing one kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelGroup {
    /// OS release ID of the first node of the group
    pub os_id: String,
    /// OS tag of the first node of the group
    pub os_tag: String,
    /// Node names
    pub nodes: BTreeSet<String>,
}

/// Kernel version to the GPU nodes running it
pub type KernelPartitionMap = BTreeMap<String, KernelGroup>;

/// Group nodes by exact kernel string
pub fn partition_by_kernel(nodes: &[NodeFact]) -> KernelPartitionMap {
    let mut sorted: Vec<&NodeFact> = nodes.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut map = KernelPartitionMap::new();
    for node in sorted {
        map.entry(node.kernel.clone())
            .or_insert_with(|| KernelGroup {
                os_id: node.os_id.clone(),
                os_tag: node.os_tag(),
                nodes: BTreeSet::new(),
            })
            .nodes
            .insert(node.name.clone());
    }
    map
}

/// One concrete driver DaemonSet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVariant {
    /// DaemonSet name
    pub name: String,
    /// Driver image
    pub image: String,
    /// Kernel the variant is pinned to (precompiled mode only)
    pub kernel: Option<String>,
    /// OS release ID the variant targets
    pub os_id: String,
    /// OS tag the variant targets
    pub os_tag: String,
}

/// Decide the driver variants for the current fleet.
///
/// Returns no variant when there is no GPU node to target.
pub fn driver_variants(
    base_name: &str,
    driver: &DriverSpec,
    fallback: Option<&str>,
    facts: &EnvironmentFacts,
) -> Result<Vec<DriverVariant>, ControllerError> {
    if !driver.use_precompiled() {
        let Some(os) = facts.os() else {
            return Ok(Vec::new());
        };
        let os_tag = os.os_tag();
        let image = resolve_image(Component::Driver, &driver.common, fallback, Some(&os_tag))?;
        return Ok(vec![DriverVariant {
            name: base_name.to_string(),
            image,
            kernel: None,
            os_id: os.os_id.clone(),
            os_tag,
        }]);
    }

    if driver.common.is_digest() {
        return Err(ControllerError::InvalidConfig(
            "precompiled drivers are selected by tag; driver.version cannot be a digest".to_string(),
        ));
    }

    let variants: Vec<DriverVariant> = facts
        .kernel_partitions()
        .into_iter()
        .map(|(kernel, group)| {
            let suffix = format!("{}-{}", kernel, group.os_tag);
            let image = resolve_image(Component::Driver, &driver.common, fallback, Some(&suffix))?;
            Ok(DriverVariant {
                name: variant_name(base_name, &kernel, &group.os_tag),
                image,
                kernel: Some(kernel),
                os_id: group.os_id,
                os_tag: group.os_tag,
            })
        })
        .collect::<Result<_, ControllerError>>()?;

    let mut names = BTreeSet::new();
    for variant in &variants {
        if !names.insert(variant.name.as_str()) {
            return Err(ControllerError::InvalidConfig(format!(
                "driver variants of kernel {} collide on name {}",
                variant.kernel.as_deref().unwrap_or_default(),
                variant.name
            )));
        }
    }
    Ok(variants)
}

/// DaemonSet name of a precompiled variant
pub fn variant_name(base_name: &str, kernel: &str, os_tag: &str) -> String {
    let raw = format!("{}-{}-{}", base_name, kernel, os_tag);
    truncate_name(&sanitize(&raw))
}

/// Label-safe form of a kernel string
pub fn kernel_label_value(kernel: &str) -> String {
    truncate_name(&sanitize(kernel))
}

fn sanitize(value: &str) -> String {
    value
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect()
}

/// Fit a sanitized value into a DNS label.
///
/// Values over the limit keep a prefix and end in a hash of the whole value,
/// so inputs sharing a long prefix stay distinct.
fn truncate_name(value: &str) -> String {
    if value.len() <= MAX_NAME_LEN {
        return value.trim_end_matches(['-', '.']).to_string();
    }
    let hash = format!("{:08x}", fnv1a(value.as_bytes()));
    let head: String = value.chars().take(MAX_NAME_LEN - hash.len() - 1).collect();
    format!("{}-{}", head.trim_end_matches(['-', '.']), hash)
}

// 32-bit FNV-1a, stable across builds and platforms
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5_u32, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193))
}
