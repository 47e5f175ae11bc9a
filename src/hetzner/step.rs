//! Error plumbing for individual provisioning and teardown steps.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::{Canceled, until_canceled};
use crate::kubeconfig::KubeconfigError;
use crate::process::ProcessError;

use super::error::CloudError;

/// Failure of one step, before it is attributed to a cluster operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub(crate) enum StepError {
    /// The caller's token fired.
    #[error("canceled")]
    Canceled,
    /// A cloud API call failed.
    #[error(transparent)]
    Cloud(#[from] CloudError),
    /// A remote command over SSH failed.
    #[error("{0}")]
    Remote(String),
    /// Backend state contradicts what the step expects.
    #[error("{0}")]
    Conflict(String),
    /// The fetched kubeconfig is unusable or could not be written.
    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
    /// A local subprocess could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl From<Canceled> for StepError {
    fn from(_: Canceled) -> Self {
        Self::Canceled
    }
}

/// Awaits a cloud call unless `ctx` fires first.
pub(crate) async fn call<T, F>(ctx: &CancellationToken, future: F) -> Result<T, StepError>
where
    F: Future<Output = Result<T, CloudError>>,
{
    Ok(until_canceled(ctx, future).await??)
}

/// A step failure tagged with the stage it happened in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct StageFailure {
    pub(crate) stage: &'static str,
    pub(crate) error: StepError,
}

impl StageFailure {
    pub(crate) const fn new(stage: &'static str, error: StepError) -> Self {
        Self { stage, error }
    }

    pub(crate) const fn is_canceled(&self) -> bool {
        matches!(self.error, StepError::Canceled)
    }
}

/// Tags a step result with its stage.
pub(crate) trait StageExt<T> {
    fn stage(self, stage: &'static str) -> Result<T, StageFailure>;
}

impl<T, E: Into<StepError>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T, StageFailure> {
        self.map_err(|err| StageFailure::new(stage, err.into()))
    }
}
