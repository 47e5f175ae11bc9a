//! Binary entry point for the devkube CLI.

mod cli;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use devkube::{
    ClusterName, CommandRunner, ConfigError, HetznerConfig, HetznerProvider, KindConfig,
    KindProvider, Kubectl, KubectlError, Provider, ProviderError,
};

use cli::{Cli, Command, DashboardArgs, ProviderKind};

/// Service the dashboard subcommand forwards to.
const DASHBOARD_SERVICE: &str = "dashboard";
const DASHBOARD_SERVICE_PORT: u16 = 80;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Kubectl(#[from] KubectlError),
    #[error("listing is incomplete: {0}")]
    Incomplete(ProviderError),
    #[error("kubeconfig path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
    #[error("cannot create a temporary directory: {0}")]
    TempDir(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let ctx = CancellationToken::new();
    tokio::spawn(cancel_on_deadline_or_interrupt(
        ctx.clone(),
        Duration::from_secs(cli.timeout),
    ));

    let mut stdout = io::stdout().lock();
    let exit_code = match run(cli, &ctx, &mut stdout).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };
    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEVKUBE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn cancel_on_deadline_or_interrupt(ctx: CancellationToken, timeout: Duration) {
    tokio::select! {
        () = ctx.cancelled() => {}
        () = tokio::time::sleep(timeout) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "deadline reached; canceling");
            ctx.cancel();
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                tracing::warn!(error = %err, "cannot listen for interrupts");
                return;
            }
            tracing::warn!("interrupted; canceling");
            ctx.cancel();
        }
    }
}

async fn run(cli: Cli, ctx: &CancellationToken, out: &mut dyn Write) -> Result<i32, CliError> {
    let provider = build_provider(cli.provider)?;
    tracing::debug!(provider = provider.name(), "provider selected");
    dispatch(cli.command, provider.as_ref(), &Kubectl::streaming(), ctx, out).await
}

fn build_provider(kind: ProviderKind) -> Result<Box<dyn Provider>, CliError> {
    Ok(match kind {
        ProviderKind::Kind => Box::new(KindProvider::from_config(
            KindConfig::load_without_cli_args()?,
        )?),
        ProviderKind::Hetzner => Box::new(HetznerProvider::from_config(
            HetznerConfig::load_without_cli_args()?,
        )?),
    })
}

fn utf8_path(path: Option<PathBuf>) -> Result<Option<Utf8PathBuf>, CliError> {
    path.map(|raw| {
        Utf8PathBuf::from_path_buf(raw)
            .map_err(|original| CliError::NonUtf8Path(original.display().to_string()))
    })
    .transpose()
}

fn write_line(out: &mut dyn Write, line: &str) {
    writeln!(out, "{line}").ok();
}

async fn dispatch<R: CommandRunner>(
    command: Command,
    provider: &dyn Provider,
    kubectl: &Kubectl<R>,
    ctx: &CancellationToken,
    out: &mut dyn Write,
) -> Result<i32, CliError> {
    match command {
        Command::Create(args) => {
            let name = ClusterName::parse(args.name)?;
            let target = utf8_path(args.kubeconfig)?;
            let path = provider.create(ctx, &name, target.as_deref()).await?;
            write_line(out, &format!("cluster {name} ready; kubeconfig written to {path}"));
        }
        Command::List => {
            let listing = provider.list(ctx).await?;
            for cluster in &listing.clusters {
                write_line(out, &format!("{}\t{}", cluster.name, cluster.status));
            }
            if let Some(err) = listing.incomplete {
                return Err(CliError::Incomplete(err));
            }
        }
        Command::Delete(args) => {
            let name = ClusterName::parse(args.name)?;
            match provider.delete(ctx, &name).await {
                Ok(report) => {
                    for resource in &report.removed {
                        write_line(out, &format!("deleted {resource}"));
                    }
                    for resource in &report.released {
                        write_line(out, &format!("released {resource}"));
                    }
                }
                Err(err) if err.is_not_found() => {
                    write_line(out, &format!("cluster {name} not found; nothing to delete"));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Export(args) => {
            let name = ClusterName::parse(args.name)?;
            let target = utf8_path(args.kubeconfig)?;
            let path = provider.export(ctx, &name, target.as_deref()).await?;
            write_line(out, &path.to_string());
        }
        Command::Setup(args) => {
            let name = ClusterName::parse(args.name)?;
            let path = provider.export(ctx, &name, None).await?;
            write_line(out, &format!("context {name} is now current in {path}"));
        }
        Command::Dashboard(args) => dashboard(args, provider, kubectl, ctx, out).await?,
    }
    Ok(0)
}

async fn dashboard<R: CommandRunner>(
    args: DashboardArgs,
    provider: &dyn Provider,
    kubectl: &Kubectl<R>,
    ctx: &CancellationToken,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let name = ClusterName::parse(args.name)?;
    let scratch = tempfile::tempdir().map_err(|err| CliError::TempDir(err.to_string()))?;
    let staged = Utf8PathBuf::from_path_buf(scratch.path().join("kubeconfig"))
        .map_err(|original| CliError::NonUtf8Path(original.display().to_string()))?;
    let kubeconfig = provider.export(ctx, &name, Some(&staged)).await?;

    write_line(
        out,
        &format!(
            "dashboard for {name} on http://127.0.0.1:{}/ (Ctrl-C to stop)",
            args.port
        ),
    );
    out.flush().ok();
    match kubectl
        .port_forward(
            ctx,
            &kubeconfig,
            &args.namespace,
            DASHBOARD_SERVICE,
            args.port,
            DASHBOARD_SERVICE_PORT,
        )
        .await
    {
        Ok(()) | Err(KubectlError::Canceled) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
