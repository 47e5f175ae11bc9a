//! Hetzner Cloud provider.
//!
//! Clusters are groups of servers sharing one private network. Membership is
//! carried entirely by labels (see [`labels`]), so every operation starts
//! from a fresh inventory. Kubernetes is installed with k3s over SSH once the
//! servers are running.

mod api;
mod bootstrap;
mod client;
mod error;
mod inventory;
pub mod labels;
mod provision;
mod step;
mod teardown;
mod wait;

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::HetznerConfig;
use crate::kubeconfig::{Kubeconfig, KubeconfigError, materialize};
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::provider::{
    ClusterListing, ClusterName, ClusterStatus, Provider, ProviderError, ProviderFuture,
    TeardownReport,
};

pub use api::{
    Action, ActionError, ActionStatus, CloudApi, CloudFuture, CreateNetwork, CreateServer,
    CreatedServer, Ipv4, Labels, Network, PrivateNet, PublicNet, Server, ServerStatus, Subnet,
};
pub use client::HttpCloudApi;
pub use error::CloudError;

use bootstrap::{API_PORT, RemoteShell, install_k3s};
use inventory::Inventory;
use provision::{FanOut, Ledger, ensure_network, provision_nodes};
use step::{StageExt, StageFailure, StepError, call};

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default number of nodes provisioned concurrently.
pub const DEFAULT_WORKER_POOL: usize = 3;

/// [`Provider`] backed by the Hetzner Cloud API.
pub struct HetznerProvider<A = HttpCloudApi, R = ProcessCommandRunner> {
    api: Arc<A>,
    shell: RemoteShell<R>,
    config: HetznerConfig,
    poll_interval: Duration,
    worker_pool: usize,
}

impl HetznerProvider {
    /// Validates `config` and wires the HTTP client and the `ssh` binary.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when validation fails or the HTTP
    /// client cannot be built.
    pub fn from_config(config: HetznerConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        let api = HttpCloudApi::new(&config.api_url, &config.token)
            .map_err(|err| ProviderError::Config(err.to_string()))?;
        Ok(Self::with_parts(
            config,
            Arc::new(api),
            Arc::new(ProcessCommandRunner),
        ))
    }
}

impl<A, R> HetznerProvider<A, R>
where
    A: CloudApi + 'static,
    R: CommandRunner + 'static,
{
    /// Builds a provider from explicit collaborators.
    #[must_use]
    pub fn with_parts(config: HetznerConfig, api: Arc<A>, runner: Arc<R>) -> Self {
        let shell = RemoteShell::new(runner, config.ssh_bin.clone(), config.ssh_user.clone());
        Self {
            api,
            shell,
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_pool: DEFAULT_WORKER_POOL,
        }
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the node worker pool size.
    #[must_use]
    pub const fn with_worker_pool(mut self, workers: usize) -> Self {
        self.worker_pool = workers;
        self
    }

    async fn list_clusters(
        &self,
        ctx: &CancellationToken,
    ) -> Result<ClusterListing, ProviderError> {
        Ok(Inventory::fetch(&*self.api, ctx, "list").await?.listing())
    }

    async fn create_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, ProviderError> {
        Inventory::fetch(&*self.api, ctx, "create")
            .await?
            .listing()
            .ensure_absent(name)?;

        tracing::info!(cluster = %name, nodes = self.config.nodes, "creating cluster");
        let ledger = Ledger::default();
        let path = self
            .provision(ctx, name, target, &ledger)
            .await
            .map_err(|failure| ledger.attribute_failure(name, failure))?;
        tracing::info!(cluster = %name, kubeconfig = %path, "cluster ready");
        Ok(path)
    }

    async fn provision(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
        ledger: &Ledger,
    ) -> Result<Utf8PathBuf, StageFailure> {
        let network = ensure_network(&*self.api, ctx, &self.config, name, ledger).await?;
        let fan_out = FanOut {
            workers: self.worker_pool,
            interval: self.poll_interval,
        };
        let nodes =
            provision_nodes(&self.api, ctx, &self.config, name, &network, ledger, fan_out).await?;
        let (control_plane, workers) = nodes.split_first().ok_or_else(|| {
            StageFailure::new(
                "create server",
                StepError::Conflict(String::from("no nodes were planned")),
            )
        })?;
        let worker_addresses: Vec<_> = workers.iter().map(|node| node.address.clone()).collect();

        install_k3s(
            &self.shell,
            ctx,
            &control_plane.address,
            &worker_addresses,
            self.poll_interval,
        )
        .await
        .stage("bootstrap")?;
        call(
            ctx,
            self.api
                .update_server_labels(control_plane.id, &labels::with_ready(&control_plane.labels)),
        )
        .await
        .stage("mark ready")?;

        let raw = self
            .shell
            .fetch_kubeconfig(ctx, &control_plane.address.public_ip)
            .await
            .stage("kubeconfig")?;
        let kubeconfig =
            cluster_kubeconfig(&raw, name, &control_plane.address.public_ip).stage("kubeconfig")?;
        materialize(&kubeconfig, target).stage("kubeconfig")
    }

    async fn delete_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
    ) -> Result<TeardownReport, ProviderError> {
        let inventory = Inventory::fetch(&*self.api, ctx, "delete").await?;
        inventory.listing().require_present(name)?;
        tracing::info!(cluster = %name, "deleting cluster");
        teardown::teardown(&*self.api, ctx, &inventory, name, self.poll_interval).await
    }

    async fn export_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, ProviderError> {
        let inventory = Inventory::fetch(&*self.api, ctx, "export").await?;
        inventory.listing().require_ready(name)?;
        let not_ready = || ProviderError::NotReady {
            cluster: name.to_string(),
            status: ClusterStatus::PartiallyProvisioned,
        };
        let control_plane = inventory.control_plane(name).ok_or_else(not_ready)?;
        let public_ip = control_plane.public_ipv4().ok_or_else(not_ready)?;

        let raw = self
            .shell
            .fetch_kubeconfig(ctx, public_ip)
            .await
            .map_err(|err| match err {
                StepError::Canceled => ProviderError::canceled(format!("export {name}")),
                other => ProviderError::Backend {
                    resource: format!("server {} ({})", control_plane.name, control_plane.id),
                    message: other.to_string(),
                },
            })?;
        let kubeconfig = cluster_kubeconfig(&raw, name, public_ip)?;
        Ok(materialize(&kubeconfig, target)?)
    }
}

/// Parses the k3s admin kubeconfig and points it at the public endpoint.
fn cluster_kubeconfig(
    raw: &str,
    name: &ClusterName,
    public_ip: &str,
) -> Result<Kubeconfig, KubeconfigError> {
    let kubeconfig = Kubeconfig::from_yaml(raw)?
        .retarget(name.as_str(), &format!("https://{public_ip}:{API_PORT}"))?;
    kubeconfig.validate()?;
    Ok(kubeconfig)
}

impl<A, R> Provider for HetznerProvider<A, R>
where
    A: CloudApi + 'static,
    R: CommandRunner + 'static,
{
    fn name(&self) -> &'static str {
        "hetzner"
    }

    fn list<'a>(&'a self, ctx: &'a CancellationToken) -> ProviderFuture<'a, ClusterListing> {
        Box::pin(self.list_clusters(ctx))
    }

    fn create<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf> {
        Box::pin(self.create_cluster(ctx, name, kubeconfig))
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
    ) -> ProviderFuture<'a, TeardownReport> {
        Box::pin(self.delete_cluster(ctx, name))
    }

    fn export<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf> {
        Box::pin(self.export_cluster(ctx, name, kubeconfig))
    }
}

#[cfg(test)]
mod tests;
