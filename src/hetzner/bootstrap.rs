//! k3s installation and kubeconfig retrieval over SSH.

use std::borrow::Cow;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::{pause, until_canceled};
use crate::process::CommandRunner;

use super::step::StepError;

const INSTALL_SCRIPT: &str = "curl -sfL https://get.k3s.io";
const NODE_TOKEN_PATH: &str = "/var/lib/rancher/k3s/server/node-token";
const KUBECONFIG_PATH: &str = "/etc/rancher/k3s/k3s.yaml";
/// API server port exposed by k3s.
pub(crate) const API_PORT: u16 = 6443;

/// Addresses of one node as seen from the operator and from the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct NodeAddress {
    pub(crate) name: String,
    pub(crate) public_ip: String,
    pub(crate) private_ip: String,
}

/// Thin `ssh` wrapper bound to one remote user.
pub(crate) struct RemoteShell<R> {
    runner: Arc<R>,
    ssh_bin: String,
    user: String,
}

impl<R> Clone for RemoteShell<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            ssh_bin: self.ssh_bin.clone(),
            user: self.user.clone(),
        }
    }
}

impl<R: CommandRunner> RemoteShell<R> {
    pub(crate) const fn new(runner: Arc<R>, ssh_bin: String, user: String) -> Self {
        Self {
            runner,
            ssh_bin,
            user,
        }
    }

    fn args(&self, host: &str, command: &str) -> Vec<OsString> {
        [
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
            "-o",
            "ConnectTimeout=10",
        ]
        .into_iter()
        .map(OsString::from)
        .chain([
            OsString::from(format!("{}@{host}", self.user)),
            OsString::from(self.privileged(command).as_ref()),
        ])
        .collect()
    }

    fn privileged<'c>(&self, command: &'c str) -> Cow<'c, str> {
        if self.user == "root" {
            Cow::Borrowed(command)
        } else {
            Cow::Owned(format!("sudo -n sh -c {}", shell_escape::escape(command.into())))
        }
    }

    /// Runs `command` on `host` and returns its stdout.
    pub(crate) async fn run(
        &self,
        ctx: &CancellationToken,
        host: &str,
        command: &str,
    ) -> Result<String, StepError> {
        let args = self.args(host, command);
        let output = until_canceled(ctx, self.runner.run(&self.ssh_bin, &args)).await??;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(StepError::Remote(format!(
            "ssh {host} exited with {}: {}",
            output.status_text(),
            output.stderr.trim()
        )))
    }

    /// Polls until `host` accepts an SSH session.
    pub(crate) async fn wait_reachable(
        &self,
        ctx: &CancellationToken,
        host: &str,
        interval: Duration,
    ) -> Result<(), StepError> {
        loop {
            match self.run(ctx, host, "true").await {
                Ok(_) => return Ok(()),
                Err(StepError::Remote(message)) => {
                    tracing::debug!(host, %message, "waiting for ssh");
                    pause(ctx, interval).await?;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Reads the k3s admin kubeconfig from the control plane.
    pub(crate) async fn fetch_kubeconfig(
        &self,
        ctx: &CancellationToken,
        host: &str,
    ) -> Result<String, StepError> {
        self.run(ctx, host, &format!("cat {KUBECONFIG_PATH}")).await
    }
}

fn server_install_command(node: &NodeAddress) -> String {
    format!(
        "{INSTALL_SCRIPT} | sh -s - server --node-ip {private} --advertise-address {private} \
         --node-external-ip {public} --tls-san {public}",
        private = shell_escape::escape(node.private_ip.as_str().into()),
        public = shell_escape::escape(node.public_ip.as_str().into()),
    )
}

fn agent_install_command(node: &NodeAddress, server_ip: &str, token: &str) -> String {
    format!(
        "{INSTALL_SCRIPT} | K3S_URL={url} K3S_TOKEN={token} sh -s - agent --node-ip {private} \
         --node-external-ip {public}",
        url = shell_escape::escape(format!("https://{server_ip}:{API_PORT}").into()),
        token = shell_escape::escape(token.into()),
        private = shell_escape::escape(node.private_ip.as_str().into()),
        public = shell_escape::escape(node.public_ip.as_str().into()),
    )
}

/// Installs the k3s server on `control_plane` and joins `workers` to it.
pub(crate) async fn install_k3s<R: CommandRunner + 'static>(
    shell: &RemoteShell<R>,
    ctx: &CancellationToken,
    control_plane: &NodeAddress,
    workers: &[NodeAddress],
    interval: Duration,
) -> Result<(), StepError> {
    for node in std::iter::once(control_plane).chain(workers) {
        shell.wait_reachable(ctx, &node.public_ip, interval).await?;
    }

    tracing::info!(node = %control_plane.name, "installing k3s server");
    shell
        .run(ctx, &control_plane.public_ip, &server_install_command(control_plane))
        .await?;
    let token = shell
        .run(ctx, &control_plane.public_ip, &format!("cat {NODE_TOKEN_PATH}"))
        .await?
        .trim()
        .to_owned();
    if token.is_empty() {
        return Err(StepError::Remote(format!(
            "{NODE_TOKEN_PATH} is empty on {}",
            control_plane.name
        )));
    }

    let mut joins = JoinSet::new();
    for worker in workers {
        let task_shell = shell.clone();
        let task_ctx = ctx.clone();
        let command = agent_install_command(worker, &control_plane.private_ip, &token);
        let host = worker.public_ip.clone();
        tracing::info!(node = %worker.name, "joining k3s agent");
        joins.spawn(async move { task_shell.run(&task_ctx, &host, &command).await });
    }
    while let Some(joined) = joins.join_next().await {
        let outcome = joined
            .map_err(|err| StepError::Remote(format!("agent join task failed: {err}")))
            .and_then(|result| result);
        if let Err(err) = outcome {
            joins.abort_all();
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use rstest::rstest;

    fn node(name: &str, octet: u8) -> NodeAddress {
        NodeAddress {
            name: name.to_owned(),
            public_ip: format!("203.0.113.{octet}"),
            private_ip: format!("10.0.0.{octet}"),
        }
    }

    fn shell(runner: &Arc<ScriptedRunner>, user: &str) -> RemoteShell<ScriptedRunner> {
        RemoteShell::new(Arc::clone(runner), String::from("ssh"), user.to_owned())
    }

    #[rstest]
    fn non_root_commands_are_wrapped_in_sudo() {
        let runner = Arc::new(ScriptedRunner::new());
        let remote = shell(&runner, "ubuntu");
        assert_eq!(
            remote.privileged("cat /etc/rancher/k3s/k3s.yaml"),
            "sudo -n sh -c 'cat /etc/rancher/k3s/k3s.yaml'"
        );
        assert_eq!(shell(&runner, "root").privileged("true"), "true");
    }

    #[tokio::test]
    async fn install_runs_server_then_joins_workers_with_token() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success();
        runner.push_success();
        runner.push_success();
        runner.push_output(Some(0), "K10secret::server:abc\n", "");
        runner.push_success();

        let ctx = CancellationToken::new();
        install_k3s(
            &shell(&runner, "root"),
            &ctx,
            &node("dev-control-plane", 2),
            &[node("dev-worker-1", 3)],
            Duration::ZERO,
        )
        .await
        .expect("bootstrap succeeds");

        let commands: Vec<String> = runner
            .invocations()
            .iter()
            .map(crate::test_support::CommandInvocation::command_string)
            .collect();
        assert_eq!(commands.len(), 5);
        assert!(commands.iter().all(|cmd| cmd.starts_with("ssh -o BatchMode=yes")));
        let server = commands.get(2).expect("server install");
        assert!(server.contains("root@203.0.113.2"), "{server}");
        assert!(server.contains("server --node-ip 10.0.0.2"), "{server}");
        assert!(server.contains("--tls-san 203.0.113.2"), "{server}");
        let agent = commands.get(4).expect("agent join");
        assert!(agent.contains("root@203.0.113.3"), "{agent}");
        assert!(agent.contains("K3S_URL='https://10.0.0.2:6443'"), "{agent}");
        assert!(agent.contains("K3S_TOKEN='K10secret::server:abc'"), "{agent}");
    }

    #[tokio::test]
    async fn unreachable_host_is_retried_until_ssh_answers() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(Some(255), "", "Connection refused");
        runner.push_output(Some(255), "", "Connection refused");
        runner.push_success();

        let ctx = CancellationToken::new();
        shell(&runner, "root")
            .wait_reachable(&ctx, "203.0.113.2", Duration::ZERO)
            .await
            .expect("eventually reachable");
        assert_eq!(runner.invocations().len(), 3);
    }

    #[tokio::test]
    async fn failed_server_install_surfaces_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_success();
        runner.push_output(Some(1), "", "curl: (6) Could not resolve host");

        let ctx = CancellationToken::new();
        let err = install_k3s(
            &shell(&runner, "root"),
            &ctx,
            &node("dev-control-plane", 2),
            &[],
            Duration::ZERO,
        )
        .await
        .expect_err("install should fail");
        let StepError::Remote(message) = err else {
            panic!("expected remote error, got {err:?}");
        };
        assert!(message.contains("Could not resolve host"), "{message}");
    }
}
