//! Cluster Store Client
//!
//! The boundary between the GPU operator's reconciliation loop and the
//! Kubernetes API server. Provides a typed object wrapper, a kube-backed
//! implementation and (behind `test-util`) an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterStoreTrait, KubeClusterStore, ObjectKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeClusterStore::new(client);
//!
//! // List GPU nodes
//! let nodes = store.list(ObjectKind::Node, None, "nvidia.com/gpu.present=true").await?;
//! println!("{} GPU nodes", nodes.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod object;
pub mod proxy;
pub mod selector;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterStore;
pub use error::StoreError;
pub use object::{ClusterObject, ObjectKind};
pub use proxy::ProxyConfig;
pub use store_trait::ClusterStoreTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterStore;
