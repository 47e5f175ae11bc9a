//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Most nodes a single cluster may request, control plane included.
pub const MAX_NODES: u8 = 10;

/// Hetzner Cloud settings derived from defaults, configuration files and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HETZNER",
    discovery(
        app_name = "devkube",
        env_var = "DEVKUBE_CONFIG_PATH",
        config_file_name = "devkube.toml",
        dotfile_name = ".devkube.toml",
        project_file_name = "devkube.toml"
    )
)]
pub struct HetznerConfig {
    /// API token used as the bearer credential. Required.
    #[ortho_config(default = String::new())]
    pub token: String,
    /// Location servers are created in.
    #[ortho_config(default = "nbg1".to_owned())]
    pub location: String,
    /// Network zone of the shared network's subnet; must contain `location`.
    #[ortho_config(default = "eu-central".to_owned())]
    pub network_zone: String,
    /// Server type for every node.
    #[ortho_config(default = "cx22".to_owned())]
    pub server_type: String,
    /// Image name for every node.
    #[ortho_config(default = "ubuntu-24.04".to_owned())]
    pub image: String,
    /// Name of an SSH key registered in the project. Required, since nodes
    /// are bootstrapped over SSH.
    #[ortho_config(default = String::new())]
    pub ssh_key: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user for SSH sessions.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Name of the network shared by all clusters.
    #[ortho_config(default = "devkube".to_owned())]
    pub network_name: String,
    /// Nodes per cluster, control plane included.
    #[ortho_config(default = 1)]
    pub nodes: u8,
    /// Base URL of the Cloud API.
    #[ortho_config(default = "https://api.hetzner.cloud/v1".to_owned())]
    pub api_url: String,
}

/// Settings for the local `kind` provider.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DEVKUBE_KIND",
    discovery(
        app_name = "devkube",
        env_var = "DEVKUBE_CONFIG_PATH",
        config_file_name = "devkube.toml",
        dotfile_name = ".devkube.toml",
        project_file_name = "devkube.toml"
    )
)]
pub struct KindConfig {
    /// Path to the `kind` executable.
    #[ortho_config(default = "kind".to_owned())]
    pub kind_bin: String,
    /// Container runtime CLI used to inspect node containers.
    #[ortho_config(default = "docker".to_owned())]
    pub runtime_bin: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn require(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to devkube.toml",
                self.description, self.env_var, self.toml_key
            )));
        }
        Ok(())
    }
}

impl HetznerConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("devkube")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply each missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when `nodes` is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.token,
                FieldMetadata::new("Hetzner API token", "HETZNER_TOKEN", "token"),
            ),
            (
                &self.ssh_key,
                FieldMetadata::new("SSH key name", "HETZNER_SSH_KEY", "ssh_key"),
            ),
            (
                &self.location,
                FieldMetadata::new("location", "HETZNER_LOCATION", "location"),
            ),
            (
                &self.network_zone,
                FieldMetadata::new("network zone", "HETZNER_NETWORK_ZONE", "network_zone"),
            ),
            (
                &self.server_type,
                FieldMetadata::new("server type", "HETZNER_SERVER_TYPE", "server_type"),
            ),
            (
                &self.image,
                FieldMetadata::new("image", "HETZNER_IMAGE", "image"),
            ),
            (
                &self.network_name,
                FieldMetadata::new("network name", "HETZNER_NETWORK_NAME", "network_name"),
            ),
            (
                &self.ssh_bin,
                FieldMetadata::new("ssh executable", "HETZNER_SSH_BIN", "ssh_bin"),
            ),
            (
                &self.ssh_user,
                FieldMetadata::new("ssh user", "HETZNER_SSH_USER", "ssh_user"),
            ),
            (
                &self.api_url,
                FieldMetadata::new("API URL", "HETZNER_API_URL", "api_url"),
            ),
        ];
        for (value, metadata) in &required {
            metadata.require(value)?;
        }
        if !(1..=MAX_NODES).contains(&self.nodes) {
            return Err(ConfigError::Invalid(format!(
                "nodes must be between 1 and {MAX_NODES}, got {}",
                self.nodes
            )));
        }
        Ok(())
    }
}

impl KindConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("devkube")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures both executables are named.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when either is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new("kind executable", "DEVKUBE_KIND_KIND_BIN", "kind_bin")
            .require(&self.kind_bin)?;
        FieldMetadata::new(
            "container runtime executable",
            "DEVKUBE_KIND_RUNTIME_BIN",
            "runtime_bin",
        )
        .require(&self.runtime_bin)
    }
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            kind_bin: String::from("kind"),
            runtime_bin: String::from("docker"),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<ConfigError> for crate::provider::ProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
