//! Teardown from the live resource set: servers first, then the cluster's
//! claim on the shared network.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::provider::{ClusterName, ManagedResource, ProviderError, TeardownReport};

use super::api::CloudApi;
use super::inventory::Inventory;
use super::labels;
use super::step::{StepError, call};
use super::wait::wait_gone;

fn attribute(cluster: &ClusterName, resource: String, err: StepError) -> ProviderError {
    match err {
        StepError::Canceled => ProviderError::canceled(format!("delete {cluster}")),
        other => ProviderError::Backend {
            resource,
            message: other.to_string(),
        },
    }
}

/// Deletes every server labelled for `cluster`, waits for them to vanish,
/// then releases or deletes the networks it owns.
///
/// Resources that are already gone are skipped, so a re-run after a partial
/// teardown finishes the remainder.
pub(crate) async fn teardown<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    inventory: &Inventory,
    cluster: &ClusterName,
    interval: Duration,
) -> Result<TeardownReport, ProviderError> {
    let mut report = TeardownReport::default();

    let mut deleted = Vec::new();
    for server in inventory.servers_of(cluster) {
        let resource = format!("server {} ({})", server.name, server.id);
        match call(ctx, api.delete_server(server.id)).await {
            Ok(_) => {
                tracing::info!(cluster = %cluster, server_id = server.id, "deleting server");
                deleted.push(server.id);
                report
                    .removed
                    .push(ManagedResource::compute_node(server.id, &server.name, cluster));
            }
            Err(StepError::Cloud(err)) if err.is_not_found() => {
                tracing::warn!(cluster = %cluster, server_id = server.id, "server already gone");
            }
            Err(err) => return Err(attribute(cluster, resource, err)),
        }
    }
    wait_gone(api, ctx, &deleted, interval)
        .await
        .map_err(|err| attribute(cluster, String::from("servers"), err))?;

    for network in inventory.networks_of(cluster) {
        let resource = format!("network {} ({})", network.name, network.id);
        let mut remaining = network.labels.clone();
        remaining.remove(&labels::owner_key(cluster));

        if labels::owners(&remaining).next().is_some() {
            match call(ctx, api.update_network_labels(network.id, &remaining)).await {
                Ok(_) => {
                    tracing::info!(
                        cluster = %cluster,
                        network_id = network.id,
                        "released shared network"
                    );
                    report
                        .released
                        .push(ManagedResource::network(network.id, &network.name, cluster));
                }
                Err(StepError::Cloud(err)) if err.is_not_found() => {
                    tracing::warn!(
                        cluster = %cluster,
                        network_id = network.id,
                        "network already gone"
                    );
                }
                Err(err) => return Err(attribute(cluster, resource, err)),
            }
            continue;
        }

        match call(ctx, api.delete_network(network.id)).await {
            Ok(()) => {
                tracing::info!(cluster = %cluster, network_id = network.id, "deleted network");
                report
                    .removed
                    .push(ManagedResource::network(network.id, &network.name, cluster));
            }
            Err(StepError::Cloud(err)) if err.is_not_found() => {
                tracing::warn!(cluster = %cluster, network_id = network.id, "network already gone");
            }
            Err(err) => return Err(attribute(cluster, resource, err)),
        }
    }

    Ok(report)
}
