//! Polling loops over action and server state. They stop only on success,
//! on a terminal error, or when the token fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::pause;

use super::api::{Action, ActionStatus, CloudApi, Server, ServerStatus};
use super::error::CloudError;
use super::step::{StepError, call};

/// Polls `action` until it succeeds.
pub(crate) async fn wait_action<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    action: Action,
    interval: Duration,
) -> Result<(), StepError> {
    let mut current = action;
    loop {
        match current.status {
            ActionStatus::Success => return Ok(()),
            ActionStatus::Error => {
                let (code, message) = current.error.map_or_else(
                    || (String::from("unknown"), String::from("no error detail")),
                    |detail| (detail.code, detail.message),
                );
                return Err(CloudError::ActionFailed {
                    id: current.id,
                    command: current.command,
                    code,
                    message,
                }
                .into());
            }
            ActionStatus::Running => {
                tracing::debug!(
                    action_id = current.id,
                    command = %current.command,
                    "waiting for action"
                );
                pause(ctx, interval).await?;
                current = call(ctx, api.get_action(current.id)).await?;
            }
        }
    }
}

/// A running server with both of its addresses assigned.
#[derive(Clone, Debug)]
pub(crate) struct RunningServer {
    pub(crate) server: Server,
    pub(crate) public_ip: String,
    pub(crate) private_ip: String,
}

/// Polls a server until it runs with a public IPv4 and an address on
/// `network`.
pub(crate) async fn wait_running<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    server_id: u64,
    network: u64,
    interval: Duration,
) -> Result<RunningServer, StepError> {
    loop {
        let server = call(ctx, api.get_server(server_id))
            .await?
            .ok_or_else(|| CloudError::Api {
                endpoint: format!("GET /servers/{server_id}"),
                status: 404,
                code: String::from("not_found"),
                message: String::from("server disappeared while starting"),
            })?;
        let addresses = server
            .public_ipv4()
            .zip(server.private_ip(network))
            .map(|(public, private)| (public.to_owned(), private.to_owned()));
        match addresses {
            Some((public_ip, private_ip)) if server.status == ServerStatus::Running => {
                return Ok(RunningServer {
                    server,
                    public_ip,
                    private_ip,
                });
            }
            _ => {}
        }
        tracing::debug!(server_id, status = ?server.status, "waiting for server");
        pause(ctx, interval).await?;
    }
}

/// Polls until none of `server_ids` exists any more.
pub(crate) async fn wait_gone<A: CloudApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
    server_ids: &[u64],
    interval: Duration,
) -> Result<(), StepError> {
    let mut remaining = server_ids.to_vec();
    loop {
        let mut still_present = Vec::with_capacity(remaining.len());
        for id in remaining {
            if call(ctx, api.get_server(id)).await?.is_some() {
                still_present.push(id);
            }
        }
        if still_present.is_empty() {
            return Ok(());
        }
        tracing::debug!(servers = ?still_present, "waiting for servers to disappear");
        remaining = still_present;
        pause(ctx, interval).await?;
    }
}
