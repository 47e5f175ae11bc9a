//! Local clusters managed by `kind`.
//!
//! Cluster membership comes from the node containers kind labels with
//! [`containers::CLUSTER_LABEL`]; lifecycle changes go through the `kind`
//! CLI. Kind's own kubeconfig output is staged in a temporary directory so
//! the user's kubeconfig is only ever touched by the materializer.

mod containers;

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::KindConfig;
use crate::context::until_canceled;
use crate::kubeconfig::{Kubeconfig, materialize};
use crate::process::{CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError};
use crate::provider::{
    ClusterListing, ClusterName, ManagedResource, Provider, ProviderError, ProviderFuture,
    TeardownReport,
};

/// [`Provider`] backed by the `kind` CLI and a container runtime.
pub struct KindProvider<R = ProcessCommandRunner> {
    config: KindConfig,
    runner: Arc<R>,
}

impl KindProvider {
    /// Validates `config` and uses real subprocesses.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when an executable name is empty.
    pub fn from_config(config: KindConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self::with_runner(config, Arc::new(ProcessCommandRunner)))
    }
}

fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

fn stderr_summary(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit status {}", output.status_text())
    } else {
        stderr.to_owned()
    }
}

impl<R: CommandRunner> KindProvider<R> {
    /// Builds a provider around an explicit runner.
    #[must_use]
    pub const fn with_runner(config: KindConfig, runner: Arc<R>) -> Self {
        Self { config, runner }
    }

    /// Runs `program`, resolving to `None` when `ctx` fires first.
    async fn run(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: Vec<OsString>,
    ) -> Result<Option<CommandOutput>, ProcessError> {
        match until_canceled(ctx, self.runner.run(program, &args)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn list_clusters(
        &self,
        ctx: &CancellationToken,
    ) -> Result<ClusterListing, ProviderError> {
        let unreachable = |message: String| ProviderError::BackendUnreachable {
            resource: String::from("node containers"),
            message,
        };
        let output = self
            .run(ctx, &self.config.runtime_bin, os_args(containers::ps_args()))
            .await
            .map_err(|err| unreachable(err.to_string()))?
            .ok_or_else(|| ProviderError::canceled("list"))?;
        if !output.is_success() {
            return Err(unreachable(stderr_summary(&output)));
        }
        let nodes = containers::parse(&output.stdout)
            .map_err(|err| unreachable(format!("unexpected runtime output: {err}")))?;
        Ok(containers::listing(&nodes))
    }

    async fn create_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, ProviderError> {
        self.list_clusters(ctx).await?.ensure_absent(name)?;
        tracing::info!(cluster = %name, "creating kind cluster");

        let staging = tempfile::tempdir()
            .map_err(|err| ProviderError::Backend {
                resource: String::from("kubeconfig staging directory"),
                message: err.to_string(),
            })?;
        let staged = staging.path().join("kubeconfig");
        let args = os_args([
            OsString::from("create"),
            OsString::from("cluster"),
            OsString::from("--name"),
            OsString::from(name.as_str()),
            OsString::from("--kubeconfig"),
            staged.into_os_string(),
        ]);
        let output = match self.run(ctx, &self.config.kind_bin, args).await {
            Ok(Some(output)) => output,
            Ok(None) => return Err(self.creation_canceled(name).await),
            Err(err) => {
                let message = err.to_string();
                return Err(self.creation_failed(name, "create cluster", message).await);
            }
        };
        if !output.is_success() {
            let message = stderr_summary(&output);
            return Err(self.creation_failed(name, "create cluster", message).await);
        }

        match self.write_kubeconfig(ctx, name, target).await {
            Ok(path) => {
                tracing::info!(cluster = %name, kubeconfig = %path, "kind cluster ready");
                Ok(path)
            }
            Err(err) if err.is_canceled() => Err(self.creation_canceled(name).await),
            Err(err) => Err(self.creation_failed(name, "kubeconfig", err.to_string()).await),
        }
    }

    /// Re-lists the node containers of `name` after an interrupted create.
    ///
    /// Uses a fresh token: the caller's may already have fired.
    async fn left_behind(&self, name: &ClusterName) -> Vec<ManagedResource> {
        match self.list_clusters(&CancellationToken::new()).await {
            Ok(listing) => listing
                .find(name)
                .map(|summary| summary.resources.clone())
                .unwrap_or_default(),
            Err(err) => {
                tracing::warn!(
                    cluster = %name,
                    error = %err,
                    "cannot list what the interrupted create left behind"
                );
                Vec::new()
            }
        }
    }

    async fn creation_canceled(&self, name: &ClusterName) -> ProviderError {
        let left_behind = self.left_behind(name).await;
        tracing::warn!(
            cluster = %name,
            left_behind = left_behind.len(),
            "kind cluster creation canceled"
        );
        ProviderError::Canceled {
            operation: format!("create {name}"),
            left_behind,
        }
    }

    async fn creation_failed(
        &self,
        name: &ClusterName,
        stage: &str,
        message: String,
    ) -> ProviderError {
        let left_behind = self.left_behind(name).await;
        tracing::warn!(
            cluster = %name,
            stage,
            left_behind = left_behind.len(),
            "kind cluster creation failed"
        );
        ProviderError::ProvisioningFailed {
            cluster: name.to_string(),
            stage: stage.to_owned(),
            message,
            left_behind,
        }
    }

    /// Reads kind's kubeconfig for `name` from stdout and materializes it.
    async fn write_kubeconfig(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, ProviderError> {
        let backend = |message: String| ProviderError::Backend {
            resource: format!("kind cluster {name}"),
            message,
        };
        let args = os_args(["get", "kubeconfig", "--name", name.as_str()]);
        let output = self
            .run(ctx, &self.config.kind_bin, args)
            .await
            .map_err(|err| backend(err.to_string()))?
            .ok_or_else(|| ProviderError::canceled(format!("kubeconfig {name}")))?;
        if !output.is_success() {
            return Err(backend(stderr_summary(&output)));
        }

        let raw = Kubeconfig::from_yaml(&output.stdout)?;
        let endpoint = raw.endpoint()?.to_owned();
        let kubeconfig = raw.retarget(name.as_str(), &endpoint)?;
        Ok(materialize(&kubeconfig, target)?)
    }

    async fn delete_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
    ) -> Result<TeardownReport, ProviderError> {
        let listing = self.list_clusters(ctx).await?;
        let summary = listing.require_present(name)?;
        tracing::info!(cluster = %name, nodes = summary.resources.len(), "deleting kind cluster");

        let args = os_args(["delete", "cluster", "--name", name.as_str()]);
        let backend = |message: String| ProviderError::Backend {
            resource: format!("kind cluster {name}"),
            message,
        };
        let output = self
            .run(ctx, &self.config.kind_bin, args)
            .await
            .map_err(|err| backend(err.to_string()))?
            .ok_or_else(|| ProviderError::canceled(format!("delete {name}")))?;
        if !output.is_success() {
            return Err(backend(stderr_summary(&output)));
        }
        Ok(TeardownReport {
            removed: summary.resources.clone(),
            released: Vec::new(),
        })
    }

    async fn export_cluster(
        &self,
        ctx: &CancellationToken,
        name: &ClusterName,
        target: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf, ProviderError> {
        self.list_clusters(ctx).await?.require_ready(name)?;
        self.write_kubeconfig(ctx, name, target).await
    }
}

impl<R: CommandRunner + 'static> Provider for KindProvider<R> {
    fn name(&self) -> &'static str {
        "kind"
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
