//! Shared fixtures for lifecycle BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use devkube::hetzner::HetznerProvider;
use devkube::test_support::{FakeCloud, ScriptedRunner, hetzner_config};
use devkube::{HetznerConfig, ProviderError, TeardownReport};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

pub type TestProvider = HetznerProvider<FakeCloud, ScriptedRunner>;

#[derive(Clone)]
pub struct LifecycleContext {
    pub cloud: Arc<FakeCloud>,
    pub runner: Arc<ScriptedRunner>,
    pub config: HetznerConfig,
    pub kubeconfig: Utf8PathBuf,
    pub baseline_mutations: usize,
    pub outcome: Option<Outcome>,
    _dir: Arc<TempDir>,
}

impl LifecycleContext {
    /// Provider over this context's cloud and runner, without polling delays.
    pub fn provider(&self) -> TestProvider {
        HetznerProvider::with_parts(
            self.config.clone(),
            Arc::clone(&self.cloud),
            Arc::clone(&self.runner),
        )
        .with_poll_interval(Duration::ZERO)
    }
}

#[derive(Clone, Debug)]
pub enum Outcome {
    Written(Utf8PathBuf),
    Deleted(TeardownReport),
    Failed(ProviderError),
}

#[derive(Debug, Error)]
pub enum LifecycleTestError {
    #[error("invalid lifecycle fixture: {0}")]
    Fixture(String),
}

pub type LifecycleContextResult = Result<LifecycleContext, LifecycleTestError>;

#[fixture]
pub fn lifecycle_context_result() -> LifecycleContextResult {
    let dir = TempDir::new().map_err(|err| LifecycleTestError::Fixture(err.to_string()))?;
    let kubeconfig = Utf8PathBuf::from_path_buf(dir.path().join("kube").join("config"))
        .map_err(|path| LifecycleTestError::Fixture(format!("non UTF-8 path {}", path.display())))?;
    Ok(LifecycleContext {
        cloud: Arc::new(FakeCloud::new()),
        runner: Arc::new(ScriptedRunner::new()),
        config: hetzner_config(),
        kubeconfig,
        baseline_mutations: 0,
        outcome: None,
        _dir: Arc::new(dir),
    })
}

#[fixture]
pub fn lifecycle_context(lifecycle_context_result: LifecycleContextResult) -> LifecycleContext {
    lifecycle_context_result
        .unwrap_or_else(|err| panic!("lifecycle context fixture should initialise: {err}"))
}
