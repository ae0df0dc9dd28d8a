//! GPU Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the GPU operator.

pub mod cluster_policy;
pub mod common;
pub mod schema;
pub mod status;


pub use cluster_policy::*;
pub use common::*;
pub use status::*;
