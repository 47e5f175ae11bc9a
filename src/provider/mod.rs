//! Provider abstraction for cluster lifecycle backends.
//!
//! Every backend (a local container engine, a cloud API) implements
//! [`Provider`]. Operations take a cancellation token owned by the caller and
//! re-derive cluster membership from live backend state on each call; no
//! provider keeps cluster state between invocations.
//!
//! Callers must not run two operations for the *same* cluster name
//! concurrently. Operations on different names share nothing.

mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

pub use error::ProviderError;
pub use types::{
    ClusterListing, ClusterName, ClusterStatus, ClusterSummary, MAX_CLUSTER_NAME_LEN,
    ManagedResource, ResourceKind, TeardownReport,
};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Uniform lifecycle contract implemented by every backend.
pub trait Provider: Send + Sync {
    /// Short identifier used in logs (for example `kind`).
    fn name(&self) -> &'static str;

    /// Enumerates clusters from live backend inventory.
    ///
    /// Partial enumeration returns `Ok` with
    /// [`ClusterListing::incomplete`] set; total failure returns
    /// [`ProviderError::BackendUnreachable`].
    fn list<'a>(&'a self, ctx: &'a CancellationToken) -> ProviderFuture<'a, ClusterListing>;

    /// Provisions a cluster and writes its kubeconfig to `kubeconfig`, or to
    /// the provider default when `None`. Returns the written path.
    ///
    /// Failures leave created resources in place and report them through
    /// [`ProviderError::left_behind`].
    fn create<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf>;

    /// Removes every resource labelled for `name`, dependents first.
    fn delete<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
    ) -> ProviderFuture<'a, TeardownReport>;

    /// Writes a fresh kubeconfig for a ready cluster and returns its path.
    fn export<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf>;
}
