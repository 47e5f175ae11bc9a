//! Labelling convention correlating cloud resources with clusters.

use crate::provider::ClusterName;

use super::api::Labels;

/// Present with value `true` on every resource this tool creates.
pub const MANAGED: &str = "devkube.io/managed";
/// Cluster name on servers.
pub const CLUSTER: &str = "devkube.io/cluster";
/// Node role on servers.
pub const ROLE: &str = "devkube.io/role";
/// Set to `true` on the control plane once Kubernetes is serving.
pub const READY: &str = "devkube.io/ready";
/// Prefix of per-cluster owner labels on the shared network.
pub const OWNER_PREFIX: &str = "owner.devkube.io/";

const TRUE: &str = "true";

/// Role of a node within its cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeRole {
    /// Runs the Kubernetes API server.
    ControlPlane,
    /// Runs workloads only.
    Worker,
}

impl NodeRole {
    /// Label value for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ControlPlane => "control-plane",
            Self::Worker => "worker",
        }
    }
}

/// Selector matching every managed resource.
#[must_use]
pub fn managed_selector() -> String {
    format!("{MANAGED}={TRUE}")
}

/// Owner label key for `cluster` on the shared network.
#[must_use]
pub fn owner_key(cluster: &ClusterName) -> String {
    format!("{OWNER_PREFIX}{cluster}")
}

/// Cluster names listed as owners in a network's labels.
pub fn owners(labels: &Labels) -> impl Iterator<Item = &str> {
    labels
        .iter()
        .filter(|(_, value)| value.as_str() == TRUE)
        .filter_map(|(key, _)| key.strip_prefix(OWNER_PREFIX))
}

/// Returns `true` when `labels` list `cluster` as an owner.
#[must_use]
pub fn is_owned_by(labels: &Labels, cluster: &ClusterName) -> bool {
    owners(labels).any(|owner| owner == cluster.as_str())
}

/// Labels for a freshly created shared network.
#[must_use]
pub fn network_labels(cluster: &ClusterName) -> Labels {
    Labels::from([
        (MANAGED.to_owned(), TRUE.to_owned()),
        (owner_key(cluster), TRUE.to_owned()),
    ])
}

/// Labels for a node server.
#[must_use]
pub fn server_labels(cluster: &ClusterName, role: NodeRole) -> Labels {
    Labels::from([
        (MANAGED.to_owned(), TRUE.to_owned()),
        (CLUSTER.to_owned(), cluster.to_string()),
        (ROLE.to_owned(), role.as_str().to_owned()),
    ])
}

/// Returns `true` for control-plane servers.
#[must_use]
pub fn is_control_plane(labels: &Labels) -> bool {
    labels.get(ROLE).map(String::as_str) == Some(NodeRole::ControlPlane.as_str())
}

/// Returns `true` once the control plane has been marked ready.
#[must_use]
pub fn is_ready(labels: &Labels) -> bool {
    labels.get(READY).map(String::as_str) == Some(TRUE)
}

/// Copy of `labels` with the ready marker set.
#[must_use]
pub fn with_ready(labels: &Labels) -> Labels {
    let mut marked = labels.clone();
    marked.insert(READY.to_owned(), TRUE.to_owned());
    marked
}
