//! Core library for devkube, a lifecycle tool for disposable Kubernetes
//! clusters.
//!
//! A [`Provider`] creates, lists, exports and deletes clusters on one
//! backend: [`KindProvider`] for local container clusters and
//! [`HetznerProvider`] for k3s on Hetzner Cloud servers. Providers keep no
//! state of their own; every call re-derives cluster membership from live
//! backend inventory, and the only file written is the kubeconfig.

pub mod config;
pub(crate) mod context;
pub mod hetzner;
pub mod kind;
pub mod kubeconfig;
pub mod kubectl;
pub mod process;
pub mod provider;
pub mod test_support;

pub use config::{ConfigError, HetznerConfig, KindConfig};
pub use hetzner::HetznerProvider;
pub use kind::KindProvider;
pub use kubeconfig::{Kubeconfig, KubeconfigError};
pub use kubectl::{Kubectl, KubectlError};
pub use process::{
    CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError, StreamingCommandRunner,
};
pub use provider::{
    ClusterListing, ClusterName, ClusterStatus, ClusterSummary, ManagedResource, Provider,
    ProviderError, ResourceKind, TeardownReport,
};
