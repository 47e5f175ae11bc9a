//! Error kinds shared by every provider implementation.

use thiserror::Error;

use crate::kubeconfig::KubeconfigError;

use super::types::{ClusterStatus, ManagedResource};

/// Errors surfaced by [`super::Provider`] operations.
///
/// The variants are provider independent so callers can react to a failed
/// lifecycle step without knowing which backend produced it.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised by `create` when a live cluster already uses the name.
    #[error("cluster {cluster} already exists")]
    AlreadyExists {
        /// Colliding cluster name.
        cluster: String,
    },
    /// Raised when no backend resource carries the cluster's label.
    #[error("cluster {cluster} not found")]
    NotFound {
        /// Requested cluster name.
        cluster: String,
    },
    /// Raised by `export` when the cluster is observed in any status other
    /// than ready.
    #[error("cluster {cluster} is not ready (status: {status})")]
    NotReady {
        /// Requested cluster name.
        cluster: String,
        /// Status derived from the backend at call time.
        status: ClusterStatus,
    },
    /// Raised when the backend inventory cannot be queried.
    #[error("backend unreachable while listing {resource}: {message}")]
    BackendUnreachable {
        /// Resource kind that could not be enumerated.
        resource: String,
        /// Error reported by the backend client.
        message: String,
    },
    /// Raised when `create` fails after zero or more resources were created.
    /// Nothing is rolled back; `left_behind` names what remains for `delete`.
    #[error(
        "provisioning cluster {cluster} failed during {stage}: {message}; left behind: {}",
        render_resources(.left_behind)
    )]
    ProvisioningFailed {
        /// Cluster being provisioned.
        cluster: String,
        /// Provisioning step that failed.
        stage: String,
        /// Backend error message.
        message: String,
        /// Resources created or adopted before the failure.
        left_behind: Vec<ManagedResource>,
    },
    /// Raised when the caller cancels the operation.
    #[error("{operation} canceled; left behind: {}", render_resources(.left_behind))]
    Canceled {
        /// Operation that observed the cancellation.
        operation: String,
        /// Resources created before the cancellation was observed.
        left_behind: Vec<ManagedResource>,
    },
    /// Raised when a backend call outside provisioning fails.
    #[error("backend error on {resource}: {message}")]
    Backend {
        /// Offending resource identifier.
        resource: String,
        /// Error reported by the backend.
        message: String,
    },
    /// Raised when a kubeconfig cannot be parsed, validated, or written.
    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
    /// Raised when caller input is malformed.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Offending input field.
        field: String,
        /// Human-readable reason.
        message: String,
    },
    /// Raised when provider configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Builds a [`ProviderError::Canceled`] with nothing left behind.
    #[must_use]
    pub fn canceled(operation: impl Into<String>) -> Self {
        Self::Canceled {
            operation: operation.into(),
            left_behind: Vec::new(),
        }
    }

    /// Returns `true` for [`ProviderError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`ProviderError::Canceled`].
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Resources reported as left behind by a failed or canceled `create`.
    #[must_use]
    pub fn left_behind(&self) -> &[ManagedResource] {
        match self {
            Self::ProvisioningFailed { left_behind, .. } | Self::Canceled { left_behind, .. } => {
                left_behind
            }
            _ => &[],
        }
    }
}

fn render_resources(resources: &[ManagedResource]) -> String {
    if resources.is_empty() {
        return String::from("nothing");
    }
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
