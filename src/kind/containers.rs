//! Node container inventory read from the container runtime.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::provider::{
    ClusterListing, ClusterName, ClusterStatus, ClusterSummary, ManagedResource,
};

/// Label kind puts on every node container.
pub(crate) const CLUSTER_LABEL: &str = "io.x-k8s.kind.cluster";

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct NodeContainer {
    #[serde(rename = "ID")]
    pub(crate) id: String,
    #[serde(rename = "Names")]
    pub(crate) name: String,
    #[serde(rename = "State")]
    pub(crate) state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

impl NodeContainer {
    /// Value of `key` in the runtime's comma-separated label string.
    pub(crate) fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(name, value)| (name == key).then_some(value))
    }
}

/// Arguments listing every kind node container, running or not.
pub(crate) fn ps_args() -> [&'static str; 6] {
    [
        "ps",
        "-a",
        "--filter",
        "label=io.x-k8s.kind.cluster",
        "--format",
        "{{json .}}",
    ]
}

/// Parses newline-delimited JSON from `docker ps`.
pub(crate) fn parse(stdout: &str) -> Result<Vec<NodeContainer>, serde_json::Error> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Cluster status from the states of its node containers.
pub(crate) fn derive_status<'a>(states: impl IntoIterator<Item = &'a str>) -> ClusterStatus {
    let states: Vec<&str> = states.into_iter().collect();
    let any = |wanted: &[&str]| states.iter().any(|state| wanted.contains(state));

    if !states.is_empty() && states.iter().all(|state| *state == "running") {
        ClusterStatus::Ready
    } else if any(&["created", "restarting"]) {
        ClusterStatus::Provisioning
    } else if any(&["removing"]) {
        ClusterStatus::Deleting
    } else if any(&["exited", "paused", "dead"]) {
        ClusterStatus::PartiallyProvisioned
    } else {
        ClusterStatus::Unknown
    }
}

/// Groups containers by their cluster label.
pub(crate) fn listing(containers: &[NodeContainer]) -> ClusterListing {
    let mut grouped: BTreeMap<ClusterName, Vec<&NodeContainer>> = BTreeMap::new();
    for container in containers {
        let Some(raw) = container.label(CLUSTER_LABEL) else {
            continue;
        };
        match ClusterName::parse(raw) {
            Ok(name) => grouped.entry(name).or_default().push(container),
            Err(err) => {
                tracing::warn!(label = raw, error = %err, "ignoring malformed kind cluster label");
            }
        }
    }

    let clusters = grouped
        .into_iter()
        .map(|(name, nodes)| {
            let status = derive_status(nodes.iter().map(|node| node.state.as_str()));
            let resources = nodes
                .iter()
                .map(|node| ManagedResource::compute_node(&node.id, &node.name, &name))
                .collect();
            ClusterSummary {
                name,
                status,
                resources,
            }
        })
        .collect();
    ClusterListing {
        clusters,
        incomplete: None,
    }
}
