//! Command-line interface definitions for the `devkube` binary.
//!
//! Kept free of crate dependencies so the build script can include this file
//! directly when generating the manual page.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `devkube` binary.
#[derive(Debug, Parser)]
#[command(
    name = "devkube",
    version,
    about = "Create, list, export and delete disposable Kubernetes clusters",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Backend that hosts the clusters.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "DEVKUBE_PROVIDER",
        default_value_t = ProviderKind::Kind
    )]
    pub(crate) provider: ProviderKind,
    /// Seconds before the operation is canceled.
    #[arg(long, global = true, value_name = "SECS", default_value_t = 1800)]
    pub(crate) timeout: u64,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Cluster backends selectable with `--provider`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ProviderKind {
    /// Local clusters in containers, via `kind`.
    Kind,
    /// k3s clusters on Hetzner Cloud servers.
    Hetzner,
}

/// Subcommands of `devkube`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create a cluster and write its kubeconfig.
    Create(TargetArgs),
    /// List clusters and their status.
    List,
    /// Delete every resource of a cluster.
    Delete(NameArgs),
    /// Write the kubeconfig of a ready cluster.
    Export(TargetArgs),
    /// Merge a ready cluster into the default kubeconfig.
    Setup(NameArgs),
    /// Port-forward the cluster's dashboard service to localhost.
    Dashboard(DashboardArgs),
}

/// Arguments naming a cluster.
#[derive(Debug, Args)]
pub(crate) struct NameArgs {
    /// Cluster name: lowercase letters, digits and `-`.
    #[arg(long)]
    pub(crate) name: String,
}

/// Arguments naming a cluster and an optional kubeconfig destination.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Cluster name: lowercase letters, digits and `-`.
    #[arg(long)]
    pub(crate) name: String,
    /// Kubeconfig file to write; defaults to `~/.kube/config`, merged.
    #[arg(long, value_name = "PATH")]
    pub(crate) kubeconfig: Option<PathBuf>,
}

/// Arguments for `devkube dashboard`.
#[derive(Debug, Args)]
pub(crate) struct DashboardArgs {
    /// Cluster name.
    #[arg(long)]
    pub(crate) name: String,
    /// Local port to listen on.
    #[arg(long, default_value_t = 9090)]
    pub(crate) port: u16,
    /// Namespace of the dashboard service.
    #[arg(long, default_value = "default")]
    pub(crate) namespace: String,
}
