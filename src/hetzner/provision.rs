//! Resource provisioning for one cluster: shared network first, then the
//! node servers over a bounded worker pool.
//!
//! Nothing is rolled back. Every resource is recorded in the [`Ledger`] as
//! soon as the API returns its ID, so a failure can report what it leaves
//! behind.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::HetznerConfig;
use crate::provider::{ClusterName, ManagedResource, ProviderError};

use super::api::{CloudApi, CreateNetwork, CreateServer, Labels, Network, Subnet};
use super::bootstrap::NodeAddress;
use super::labels::{self, NodeRole};
use super::step::{StageExt, StageFailure, StepError, call};
use super::wait::{wait_action, wait_running};

const NETWORK_RANGE: &str = "10.0.0.0/16";
const SUBNET_RANGE: &str = "10.0.0.0/24";

/// Resources created or adopted by one `create` call.
#[derive(Clone, Debug, Default)]
pub(crate) struct Ledger(Arc<Mutex<Vec<ManagedResource>>>);

impl Ledger {
    pub(crate) fn record(&self, resource: ManagedResource) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource);
    }

    pub(crate) fn snapshot(&self) -> Vec<ManagedResource> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attributes a stage failure to `cluster`, attaching the ledger.
    pub(crate) fn attribute_failure(
        &self,
        cluster: &ClusterName,
        failure: StageFailure,
    ) -> ProviderError {
        let left_behind = self.snapshot();
        tracing::warn!(
            cluster = %cluster,
            stage = failure.stage,
            left_behind = left_behind.len(),
            "cluster creation stopped"
        );
        if failure.is_canceled() {
            return ProviderError::Canceled {
                operation: format!("create {cluster}"),
                left_behind,
            };
        }
        ProviderError::ProvisioningFailed {
            cluster: cluster.to_string(),
            stage: failure.stage.to_owned(),
            message: failure.error.to_string(),
            left_behind,
        }
    }
}

/// A server that finished provisioning.
#[derive(Clone, Debug)]
pub(crate) struct ProvisionedNode {
    pub(crate) id: u64,
    pub(crate) role: NodeRole,
    pub(crate) address: NodeAddress,
    pub(crate) labels: Labels,
}

/// Name and role of one node to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct NodePlan {
    pub(crate) name: String,
    pub(crate) role: NodeRole,
}

/// One control plane followed by `nodes - 1` workers.
pub(crate) fn plan_nodes(cluster: &ClusterName, nodes: u8) -> Vec<NodePlan> {
    std::iter::once(NodePlan {
        name: format!("{cluster}-control-plane"),
        role: NodeRole::ControlPlane,
    })
    .chain((1..nodes).map(|index| NodePlan {
        name: format!("{cluster}-worker-{index}"),
        role: NodeRole::Worker,
    }))
    .collect()
}

fn network_request(config: &HetznerConfig, cluster: &ClusterName) -> CreateNetwork {
    CreateNetwork {
        name: config.network_name.clone(),
        ip_range: NETWORK_RANGE.to_owned(),
        subnets: vec![Subnet {
            kind: String::from("cloud"),
            ip_range: SUBNET_RANGE.to_owned(),
            network_zone: config.network_zone.clone(),
        }],
        labels: labels::network_labels(cluster),
    }
}

async fn find_network<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    name: &str,
) -> Result<Option<Network>, StepError> {
    let selector = labels::managed_selector();
    let networks = call(ctx, api.list_networks(&selector)).await?;
    Ok(networks.into_iter().find(|network| network.name == name))
}

async fn adopt<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    network: Network,
    cluster: &ClusterName,
) -> Result<Network, StepError> {
    if labels::is_owned_by(&network.labels, cluster) {
        return Ok(network);
    }
    let mut owned = network.labels.clone();
    owned.insert(labels::owner_key(cluster), String::from("true"));
    let updated = call(ctx, api.update_network_labels(network.id, &owned)).await?;
    tracing::info!(cluster = %cluster, network_id = updated.id, "joined shared network");
    Ok(updated)
}

/// Reuses the shared network or creates it, labelling it as owned by
/// `cluster`.
pub(crate) async fn ensure_network<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    config: &HetznerConfig,
    cluster: &ClusterName,
    ledger: &Ledger,
) -> Result<Network, StageFailure> {
    const STAGE: &str = "network";

    let network = match find_network(api, ctx, &config.network_name).await.stage(STAGE)? {
        Some(existing) => adopt(api, ctx, existing, cluster).await.stage(STAGE)?,
        None => match call(ctx, api.create_network(&network_request(config, cluster))).await {
            Ok(created) => {
                tracing::info!(
                    cluster = %cluster,
                    network_id = created.id,
                    "created shared network"
                );
                created
            }
            Err(StepError::Cloud(err)) if err.is_uniqueness() => {
                tracing::info!(
                    cluster = %cluster,
                    network = %config.network_name,
                    "network created concurrently; reusing it"
                );
                let existing = find_network(api, ctx, &config.network_name)
                    .await
                    .stage(STAGE)?
                    .ok_or_else(|| {
                        StageFailure::new(
                            STAGE,
                            StepError::Conflict(format!(
                                "network {} exists but is not managed by devkube",
                                config.network_name
                            )),
                        )
                    })?;
                adopt(api, ctx, existing, cluster).await.stage(STAGE)?
            }
            Err(err) => return Err(StageFailure::new(STAGE, err)),
        },
    };
    ledger.record(ManagedResource::network(network.id, &network.name, cluster));
    Ok(network)
}

/// Everything a node task needs, owned so it can run on its own task.
struct NodeJob<A: ?Sized> {
    api: Arc<A>,
    ctx: CancellationToken,
    ledger: Ledger,
    cluster: ClusterName,
    request: CreateServer,
    role: NodeRole,
    network: u64,
    interval: Duration,
}

impl<A: CloudApi + ?Sized> NodeJob<A> {
    async fn run(self) -> Result<ProvisionedNode, StageFailure> {
        let api = &*self.api;
        let ctx = &self.ctx;

        let created = call(ctx, api.create_server(&self.request))
            .await
            .stage("create server")?;
        let server_id = created.server.id;
        self.ledger.record(ManagedResource::compute_node(
            server_id,
            &created.server.name,
            &self.cluster,
        ));
        tracing::info!(
            cluster = %self.cluster,
            server_id,
            name = %created.server.name,
            "created server"
        );
        wait_action(api, ctx, created.action, self.interval)
            .await
            .stage("create server")?;

        let attach = call(ctx, api.attach_to_network(server_id, self.network))
            .await
            .stage("attach network")?;
        wait_action(api, ctx, attach, self.interval)
            .await
            .stage("attach network")?;
        tracing::info!(
            cluster = %self.cluster,
            server_id,
            network_id = self.network,
            "attached server"
        );

        let power = call(ctx, api.power_on(server_id)).await.stage("power on")?;
        wait_action(api, ctx, power, self.interval)
            .await
            .stage("power on")?;
        let running = wait_running(api, ctx, server_id, self.network, self.interval)
            .await
            .stage("wait running")?;
        tracing::info!(
            cluster = %self.cluster,
            server_id,
            ip = %running.public_ip,
            "server running"
        );

        Ok(ProvisionedNode {
            id: server_id,
            role: self.role,
            address: NodeAddress {
                name: running.server.name,
                public_ip: running.public_ip,
                private_ip: running.private_ip,
            },
            labels: running.server.labels,
        })
    }
}

/// Pool and polling settings for node provisioning.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FanOut {
    pub(crate) workers: usize,
    pub(crate) interval: Duration,
}

/// Creates, attaches and starts every planned node.
///
/// The first failure cancels the remaining node tasks; servers already
/// created stay in place and in the ledger.
pub(crate) async fn provision_nodes<A: CloudApi + ?Sized + 'static>(
    api: &Arc<A>,
    ctx: &CancellationToken,
    config: &HetznerConfig,
    cluster: &ClusterName,
    network: &Network,
    ledger: &Ledger,
    fan_out: FanOut,
) -> Result<Vec<ProvisionedNode>, StageFailure> {
    let permits = Arc::new(Semaphore::new(fan_out.workers.max(1)));
    let siblings = ctx.child_token();
    let mut tasks = JoinSet::new();

    for plan in plan_nodes(cluster, config.nodes) {
        let job = NodeJob {
            api: Arc::clone(api),
            ctx: siblings.clone(),
            ledger: ledger.clone(),
            cluster: cluster.clone(),
            request: CreateServer {
                name: plan.name,
                server_type: config.server_type.clone(),
                image: config.image.clone(),
                location: config.location.clone(),
                start_after_create: false,
                labels: labels::server_labels(cluster, plan.role),
                ssh_keys: vec![config.ssh_key.clone()],
            },
            role: plan.role,
            network: network.id,
            interval: fan_out.interval,
        };
        let pool = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|_| StageFailure::new("schedule", StepError::Canceled))?;
            job.run().await
        });
    }

    let mut nodes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|err| {
            Err(StageFailure::new(
                "node task",
                StepError::Conflict(format!("node task aborted: {err}")),
            ))
        });
        match outcome {
            Ok(node) => nodes.push(node),
            Err(failure) => {
                siblings.cancel();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(failure);
            }
        }
    }

    nodes.sort_by(|left, right| {
        (left.role != NodeRole::ControlPlane, &left.address.name)
            .cmp(&(right.role != NodeRole::ControlPlane, &right.address.name))
    });
    Ok(nodes)
}
