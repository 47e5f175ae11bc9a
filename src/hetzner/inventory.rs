//! Live inventory of managed networks and servers, grouped into clusters.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use crate::context::until_canceled;
use crate::provider::{
    ClusterListing, ClusterName, ClusterStatus, ClusterSummary, ManagedResource, ProviderError,
};

use super::api::{CloudApi, Network, Server, ServerStatus};
use super::error::CloudError;
use super::labels;

/// Snapshot of managed resources taken by one `list` call.
#[derive(Clone, Debug, Default)]
pub(crate) struct Inventory {
    networks: Vec<Network>,
    servers: Vec<Server>,
    incomplete: Option<ProviderError>,
}

fn unreachable(resource: &str, err: &CloudError) -> ProviderError {
    ProviderError::BackendUnreachable {
        resource: resource.to_owned(),
        message: err.to_string(),
    }
}

impl Inventory {
    /// Lists networks and servers concurrently.
    ///
    /// Fails only when neither kind could be listed; a single failed kind is
    /// recorded as `incomplete`.
    pub(crate) async fn fetch<A: CloudApi + ?Sized>(
        api: &A,
        ctx: &CancellationToken,
        operation: &str,
    ) -> Result<Self, ProviderError> {
        let selector = labels::managed_selector();
        let (networks, servers) = until_canceled(ctx, async {
            tokio::join!(api.list_networks(&selector), api.list_servers(&selector))
        })
        .await
        .map_err(|_| ProviderError::canceled(operation))?;

        match (networks, servers) {
            (Ok(networks), Ok(servers)) => Ok(Self {
                networks,
                servers,
                incomplete: None,
            }),
            (Ok(networks), Err(err)) => Ok(Self {
                networks,
                servers: Vec::new(),
                incomplete: Some(unreachable("servers", &err)),
            }),
            (Err(err), Ok(servers)) => Ok(Self {
                networks: Vec::new(),
                servers,
                incomplete: Some(unreachable("networks", &err)),
            }),
            (Err(network_err), Err(server_err)) => Err(ProviderError::BackendUnreachable {
                resource: String::from("networks and servers"),
                message: format!("{network_err}; {server_err}"),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) const fn from_parts(networks: Vec<Network>, servers: Vec<Server>) -> Self {
        Self {
            networks,
            servers,
            incomplete: None,
        }
    }

    /// Servers labelled for `cluster`.
    pub(crate) fn servers_of<'a>(
        &'a self,
        cluster: &'a ClusterName,
    ) -> impl Iterator<Item = &'a Server> + 'a {
        self.servers.iter().filter(move |server| {
            server.labels.get(labels::CLUSTER).map(String::as_str) == Some(cluster.as_str())
        })
    }

    /// Networks listing `cluster` as an owner.
    pub(crate) fn networks_of<'a>(
        &'a self,
        cluster: &'a ClusterName,
    ) -> impl Iterator<Item = &'a Network> + 'a {
        self.networks
            .iter()
            .filter(move |network| labels::is_owned_by(&network.labels, cluster))
    }

    /// Control-plane server of `cluster`.
    pub(crate) fn control_plane<'a>(&'a self, cluster: &'a ClusterName) -> Option<&'a Server> {
        self.servers_of(cluster)
            .find(|server| labels::is_control_plane(&server.labels))
    }

    /// Groups the snapshot into clusters sorted by name.
    pub(crate) fn listing(&self) -> ClusterListing {
        let mut names = BTreeSet::new();
        let candidates = self
            .servers
            .iter()
            .filter_map(|server| server.labels.get(labels::CLUSTER).map(String::as_str))
            .chain(
                self.networks
                    .iter()
                    .flat_map(|network| labels::owners(&network.labels)),
            );
        for raw in candidates {
            match ClusterName::parse(raw) {
                Ok(name) => {
                    names.insert(name);
                }
                Err(err) => {
                    tracing::warn!(label = raw, error = %err, "ignoring malformed cluster label");
                }
            }
        }

        let clusters = names
            .into_iter()
            .map(|name| self.summarise(name))
            .collect();
        ClusterListing {
            clusters,
            incomplete: self.incomplete.clone(),
        }
    }

    fn summarise(&self, name: ClusterName) -> ClusterSummary {
        let networks: Vec<&Network> = self.networks_of(&name).collect();
        let servers: Vec<&Server> = self.servers_of(&name).collect();
        let status = derive_status(&networks, &servers);
        let resources = networks
            .iter()
            .map(|network| ManagedResource::network(network.id, &network.name, &name))
            .chain(
                servers
                    .iter()
                    .map(|server| ManagedResource::compute_node(server.id, &server.name, &name)),
            )
            .collect();
        ClusterSummary {
            name,
            status,
            resources,
        }
    }
}

/// Derives a cluster status from its live resources.
pub(crate) fn derive_status(networks: &[&Network], servers: &[&Server]) -> ClusterStatus {
    let any = |wanted: &[ServerStatus]| {
        servers
            .iter()
            .any(|server| wanted.contains(&server.status))
    };

    if any(&[ServerStatus::Deleting, ServerStatus::Stopping]) {
        return ClusterStatus::Deleting;
    }
    if any(&[
        ServerStatus::Initializing,
        ServerStatus::Starting,
        ServerStatus::Migrating,
        ServerStatus::Rebuilding,
    ]) {
        return ClusterStatus::Provisioning;
    }
    if any(&[ServerStatus::Unknown]) {
        return ClusterStatus::Unknown;
    }

    let network_ids: Vec<u64> = networks.iter().map(|network| network.id).collect();
    let control_plane = servers
        .iter()
        .find(|server| labels::is_control_plane(&server.labels));
    let complete = !network_ids.is_empty()
        && control_plane.is_some_and(|server| labels::is_ready(&server.labels))
        && servers.iter().all(|server| {
            server.status == ServerStatus::Running && server.attached_to_any(&network_ids)
        });
    if complete {
        ClusterStatus::Ready
    } else {
        ClusterStatus::PartiallyProvisioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hetzner::api::{Ipv4, PrivateNet, PublicNet};
    use crate::hetzner::labels::{NodeRole, network_labels, server_labels, with_ready};
    use rstest::{fixture, rstest};

    fn name(raw: &str) -> ClusterName {
        ClusterName::parse(raw).unwrap_or_else(|err| panic!("{err}"))
    }

    fn network(cluster: &str) -> Network {
        Network {
            id: 7,
            name: String::from("devkube"),
            ip_range: String::from("10.0.0.0/16"),
            labels: network_labels(&name(cluster)),
            servers: Vec::new(),
        }
    }

    fn server(id: u64, cluster: &str, role: NodeRole, status: ServerStatus) -> Server {
        Server {
            id,
            name: format!("{cluster}-{}", role.as_str()),
            status,
            labels: server_labels(&name(cluster), role),
            public_net: PublicNet {
                ipv4: Some(Ipv4 {
                    ip: format!("203.0.113.{id}"),
                }),
            },
            private_net: vec![PrivateNet {
                network: 7,
                ip: format!("10.0.0.{id}"),
            }],
        }
    }

    fn ready_control_plane(id: u64, cluster: &str) -> Server {
        let mut cp = server(id, cluster, NodeRole::ControlPlane, ServerStatus::Running);
        cp.labels = with_ready(&cp.labels);
        cp
    }

    #[fixture]
    fn healthy() -> (Network, Vec<Server>) {
        (
            network("dev"),
            vec![
                ready_control_plane(2, "dev"),
                server(3, "dev", NodeRole::Worker, ServerStatus::Running),
            ],
        )
    }

    fn status_of(network: &Network, servers: &[Server]) -> ClusterStatus {
        let refs: Vec<&Server> = servers.iter().collect();
        derive_status(&[network], &refs)
    }

    #[rstest]
    fn healthy_cluster_is_ready(healthy: (Network, Vec<Server>)) {
        let (net, servers) = healthy;
        assert_eq!(status_of(&net, &servers), ClusterStatus::Ready);
    }

    #[rstest]
    #[case(ServerStatus::Deleting, ClusterStatus::Deleting)]
    #[case(ServerStatus::Stopping, ClusterStatus::Deleting)]
    #[case(ServerStatus::Starting, ClusterStatus::Provisioning)]
    #[case(ServerStatus::Initializing, ClusterStatus::Provisioning)]
    #[case(ServerStatus::Off, ClusterStatus::PartiallyProvisioned)]
    #[case(ServerStatus::Unknown, ClusterStatus::Unknown)]
    fn worker_status_drives_cluster_status(
        healthy: (Network, Vec<Server>),
        #[case] worker: ServerStatus,
        #[case] expected: ClusterStatus,
    ) {
        let (net, mut servers) = healthy;
        if let Some(last) = servers.last_mut() {
            last.status = worker;
        }
        assert_eq!(status_of(&net, &servers), expected);
    }

    #[rstest]
    fn unattached_or_unready_nodes_are_partial(healthy: (Network, Vec<Server>)) {
        let (net, servers) = healthy;

        let mut detached = servers.clone();
        if let Some(last) = detached.last_mut() {
            last.private_net.clear();
        }
        assert_eq!(status_of(&net, &detached), ClusterStatus::PartiallyProvisioned);

        let mut unready = servers;
        if let Some(first) = unready.first_mut() {
            first.labels.remove(labels::READY);
        }
        assert_eq!(status_of(&net, &unready), ClusterStatus::PartiallyProvisioned);
    }

    #[rstest]
    fn network_only_cluster_is_listed_as_partial() {
        let inventory = Inventory::from_parts(vec![network("orphan")], Vec::new());
        let listing = inventory.listing();
        let summary = listing.find(&name("orphan")).expect("orphan listed");
        assert_eq!(summary.status, ClusterStatus::PartiallyProvisioned);
        assert_eq!(summary.resources.len(), 1);
    }

    #[rstest]
    fn listing_is_sorted_and_groups_by_label(healthy: (Network, Vec<Server>)) {
        let (mut net, mut servers) = healthy;
        net.labels
            .insert(labels::owner_key(&name("alpha")), String::from("true"));
        servers.push(ready_control_plane(9, "alpha"));

        let listing = Inventory::from_parts(vec![net], servers).listing();
        let names: Vec<&str> = listing.names().into_iter().map(ClusterName::as_str).collect();
        assert_eq!(names, ["alpha", "dev"]);
        let dev = listing.find(&name("dev")).expect("dev listed");
        assert_eq!(dev.resources.len(), 3);
        assert_eq!(dev.status, ClusterStatus::Ready);
    }
}
