//! Thin wrapper over the `kubectl` binary.
//!
//! Every invocation names its kubeconfig and namespace explicitly; only the
//! exit status is inspected.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::until_canceled;
use crate::process::{CommandRunner, ProcessError, StreamingCommandRunner};

/// Errors raised while driving `kubectl`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KubectlError {
    /// `kubectl` exited unsuccessfully.
    #[error("kubectl exited with status {status}: {stderr}")]
    Failed {
        /// Exit status, `unknown` when terminated by a signal.
        status: String,
        /// Captured standard error, empty when streamed.
        stderr: String,
    },
    /// `kubectl` could not be started.
    #[error(transparent)]
    Spawn(#[from] ProcessError),
    /// The token fired before `kubectl` finished.
    #[error("kubectl canceled")]
    Canceled,
}

/// Runs `kubectl` through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct Kubectl<R = StreamingCommandRunner> {
    bin: String,
    runner: Arc<R>,
}

impl Kubectl {
    /// Uses `kubectl` from `PATH` with inherited stdio.
    #[must_use]
    pub fn streaming() -> Self {
        Self::new("kubectl", Arc::new(StreamingCommandRunner))
    }
}

impl<R: CommandRunner> Kubectl<R> {
    /// Creates a wrapper around `bin`.
    #[must_use]
    pub fn new(bin: impl Into<String>, runner: Arc<R>) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }

    /// Runs `kubectl --kubeconfig <path> --namespace <ns> <args>`.
    ///
    /// # Errors
    ///
    /// Returns [`KubectlError::Failed`] on a non-zero exit,
    /// [`KubectlError::Spawn`] when the binary cannot start and
    /// [`KubectlError::Canceled`] when `ctx` fires first.
    pub async fn invoke<S: AsRef<str>>(
        &self,
        ctx: &CancellationToken,
        kubeconfig: &Utf8Path,
        namespace: &str,
        args: &[S],
    ) -> Result<(), KubectlError> {
        let argv: Vec<OsString> = [
            "--kubeconfig",
            kubeconfig.as_str(),
            "--namespace",
            namespace,
        ]
        .into_iter()
        .chain(args.iter().map(S::as_ref))
        .map(OsString::from)
        .collect();

        tracing::debug!(kubeconfig = %kubeconfig, namespace, "running kubectl");
        let output = until_canceled(ctx, self.runner.run(&self.bin, &argv))
            .await
            .map_err(|_| KubectlError::Canceled)??;
        if output.is_success() {
            Ok(())
        } else {
            Err(KubectlError::Failed {
                status: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }

    /// Forwards `local_port` to `service`'s `remote_port` until `ctx` fires.
    ///
    /// # Errors
    ///
    /// As [`Self::invoke`].
    pub async fn port_forward(
        &self,
        ctx: &CancellationToken,
        kubeconfig: &Utf8Path,
        namespace: &str,
        service: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<(), KubectlError> {
        let target = format!("service/{service}");
        let ports = format!("{local_port}:{remote_port}");
        self.invoke(ctx, kubeconfig, namespace, &["port-forward", target.as_str(), ports.as_str()])
            .await
    }
}
