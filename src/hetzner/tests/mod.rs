//! Provider-level tests against the in-memory cloud.


use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::provider::{ClusterName, Provider};
use crate::test_support::{FakeCloud, ScriptedRunner, hetzner_config, script_k3s_bootstrap};

use super::HetznerProvider;

pub(super) struct Harness {
    pub(super) cloud: Arc<FakeCloud>,
    pub(super) runner: Arc<ScriptedRunner>,
    pub(super) provider: HetznerProvider<FakeCloud, ScriptedRunner>,
    pub(super) ctx: CancellationToken,
    dir: TempDir,
}

impl Harness {
    pub(super) fn new(nodes: u8) -> Self {
        Self::with_pool(nodes, super::DEFAULT_WORKER_POOL)
    }

    pub(super) fn with_pool(nodes: u8, workers: usize) -> Self {
        let cloud = Arc::new(FakeCloud::new());
        let runner = Arc::new(ScriptedRunner::new());
        let config = crate::config::HetznerConfig {
            nodes,
            ..hetzner_config()
        };
        let provider =
            HetznerProvider::with_parts(config, Arc::clone(&cloud), Arc::clone(&runner))
                .with_poll_interval(Duration::ZERO)
                .with_worker_pool(workers);
        Self {
            cloud,
            runner,
            provider,
            ctx: CancellationToken::new(),
            dir: tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}")),
        }
    }

    pub(super) fn kubeconfig(&self, file: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(file))
            .unwrap_or_else(|path| panic!("non UTF-8 temp path {}", path.display()))
    }

    /// Creates `name` with a fully scripted bootstrap.
    pub(super) async fn create_ready(&self, name: &str, nodes: u8) -> Utf8PathBuf {
        script_k3s_bootstrap(&self.runner, nodes);
        let cluster = cluster(name);
        let target = self.kubeconfig(&format!("{name}.yaml"));
        self.provider
            .create(&self.ctx, &cluster, Some(&target))
            .await
            .unwrap_or_else(|err| panic!("create {name}: {err}"))
    }
}

pub(super) fn cluster(name: &str) -> ClusterName {
    ClusterName::parse(name).unwrap_or_else(|err| panic!("cluster name {name}: {err}"))
}

#[fixture]
pub(super) fn single_node() -> Harness {
    Harness::new(1)
}
