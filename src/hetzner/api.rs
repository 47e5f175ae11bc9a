//! Typed subset of the Hetzner Cloud API used by the provider, and the
//! [`CloudApi`] seam that the HTTP client and test doubles implement.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::CloudError;

/// Resource labels as stored by the API.
pub type Labels = BTreeMap<String, String>;

/// Future returned by [`CloudApi`] calls.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Private network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Network {
    /// Network ID.
    pub id: u64,
    /// Unique network name.
    pub name: String,
    /// IPv4 range in CIDR notation.
    #[serde(default)]
    pub ip_range: String,
    /// Labels attached to the network.
    #[serde(default)]
    pub labels: Labels,
    /// IDs of servers attached to the network.
    #[serde(default)]
    pub servers: Vec<u64>,
}

/// Power and lifecycle status reported for a server.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Powered on.
    Running,
    /// Created and still being set up by the platform.
    Initializing,
    /// Powering on.
    Starting,
    /// Powering off.
    Stopping,
    /// Powered off.
    Off,
    /// Being deleted.
    Deleting,
    /// Moving between hosts.
    Migrating,
    /// Being rebuilt from an image.
    Rebuilding,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// Public IPv4 assignment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ipv4 {
    /// Address.
    pub ip: String,
}

/// Public network configuration of a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublicNet {
    /// Primary IPv4, absent for IPv6-only servers.
    #[serde(default)]
    pub ipv4: Option<Ipv4>,
}

/// Attachment of a server to a private network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrivateNet {
    /// Network ID.
    pub network: u64,
    /// Address assigned on that network.
    pub ip: String,
}

/// Cloud server.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Server ID.
    pub id: u64,
    /// Server name.
    pub name: String,
    /// Current status.
    pub status: ServerStatus,
    /// Labels attached to the server.
    #[serde(default)]
    pub labels: Labels,
    /// Public addresses.
    #[serde(default)]
    pub public_net: PublicNet,
    /// Private network attachments.
    #[serde(default)]
    pub private_net: Vec<PrivateNet>,
}

impl Server {
    /// Public IPv4 address, if assigned.
    #[must_use]
    pub fn public_ipv4(&self) -> Option<&str> {
        self.public_net.ipv4.as_ref().map(|ipv4| ipv4.ip.as_str())
    }

    /// Address on `network`, if attached.
    #[must_use]
    pub fn private_ip(&self, network: u64) -> Option<&str> {
        self.private_net
            .iter()
            .find(|attachment| attachment.network == network)
            .map(|attachment| attachment.ip.as_str())
    }

    /// Returns `true` when attached to any of `networks`.
    #[must_use]
    pub fn attached_to_any(&self, networks: &[u64]) -> bool {
        self.private_net
            .iter()
            .any(|attachment| networks.contains(&attachment.network))
    }
}

/// Status of an asynchronous action.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Still in progress.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Error,
}

/// Error detail carried by a failed action.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Asynchronous action started by a mutating call.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Action {
    /// Action ID.
    pub id: u64,
    /// Command name, for example `create_server`.
    pub command: String,
    /// Current status.
    pub status: ActionStatus,
    /// Error detail when `status` is [`ActionStatus::Error`].
    #[serde(default)]
    pub error: Option<ActionError>,
}

/// Subnet definition for network creation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Subnet {
    /// Subnet type, `cloud` for server subnets.
    #[serde(rename = "type")]
    pub kind: String,
    /// IPv4 range in CIDR notation.
    pub ip_range: String,
    /// Network zone, for example `eu-central`.
    pub network_zone: String,
}

/// Request body for `POST /networks`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateNetwork {
    /// Unique network name.
    pub name: String,
    /// IPv4 range in CIDR notation.
    pub ip_range: String,
    /// Subnets to create.
    pub subnets: Vec<Subnet>,
    /// Labels to attach.
    pub labels: Labels,
}

/// Request body for `POST /servers`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateServer {
    /// Server name.
    pub name: String,
    /// Server type name, for example `cx22`.
    pub server_type: String,
    /// Image name, for example `ubuntu-24.04`.
    pub image: String,
    /// Location name, for example `nbg1`.
    pub location: String,
    /// Whether the server boots immediately.
    pub start_after_create: bool,
    /// Labels to attach.
    pub labels: Labels,
    /// Names or IDs of SSH keys injected at boot.
    pub ssh_keys: Vec<String>,
}

/// Response of `POST /servers`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CreatedServer {
    /// The new server.
    pub server: Server,
    /// Action tracking creation.
    pub action: Action,
}

/// Operations the provider needs from the cloud.
///
/// Implementations must be safe to call concurrently.
pub trait CloudApi: Send + Sync {
    /// Lists networks matching a label selector.
    fn list_networks<'a>(&'a self, selector: &'a str) -> CloudFuture<'a, Vec<Network>>;

    /// Creates a network.
    fn create_network<'a>(&'a self, request: &'a CreateNetwork) -> CloudFuture<'a, Network>;

    /// Replaces a network's labels.
    fn update_network_labels<'a>(&'a self, id: u64, labels: &'a Labels)
    -> CloudFuture<'a, Network>;

    /// Deletes a network.
    fn delete_network(&self, id: u64) -> CloudFuture<'_, ()>;

    /// Lists servers matching a label selector.
    fn list_servers<'a>(&'a self, selector: &'a str) -> CloudFuture<'a, Vec<Server>>;

    /// Fetches one server; `None` when it no longer exists.
    fn get_server(&self, id: u64) -> CloudFuture<'_, Option<Server>>;

    /// Creates a server.
    fn create_server<'a>(&'a self, request: &'a CreateServer) -> CloudFuture<'a, CreatedServer>;

    /// Replaces a server's labels.
    fn update_server_labels<'a>(&'a self, id: u64, labels: &'a Labels) -> CloudFuture<'a, Server>;

    /// Attaches a server to a network.
    fn attach_to_network(&self, server: u64, network: u64) -> CloudFuture<'_, Action>;

    /// Powers a server on.
    fn power_on(&self, server: u64) -> CloudFuture<'_, Action>;

    /// Deletes a server.
    fn delete_server(&self, id: u64) -> CloudFuture<'_, Action>;

    /// Fetches the current state of an action.
    fn get_action(&self, id: u64) -> CloudFuture<'_, Action>;
}
