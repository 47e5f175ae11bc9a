//! Unit tests for the `devkube` binary: dispatch and error rendering.

use std::sync::Arc;

use camino::Utf8Path;
use rstest::{fixture, rstest};

use devkube::provider::ProviderFuture;
use devkube::test_support::ScriptedRunner;
use devkube::{ClusterListing, ClusterStatus, ClusterSummary, TeardownReport};

use super::*;
use crate::cli::{NameArgs, TargetArgs};

/// Provider returning canned answers.
#[derive(Clone, Debug, Default)]
struct StubProvider {
    listing: ClusterListing,
    delete: Option<ProviderError>,
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn list<'a>(&'a self, _ctx: &'a CancellationToken) -> ProviderFuture<'a, ClusterListing> {
        let listing = self.listing.clone();
        Box::pin(async move { Ok(listing) })
    }

    fn create<'a>(
        &'a self,
        _ctx: &'a CancellationToken,
        _name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf> {
        let path = kubeconfig.map_or_else(
            || Utf8PathBuf::from("/home/dev/.kube/config"),
            Utf8Path::to_path_buf,
        );
        Box::pin(async move { Ok(path) })
    }

    fn delete<'a>(
        &'a self,
        _ctx: &'a CancellationToken,
        _name: &'a ClusterName,
    ) -> ProviderFuture<'a, TeardownReport> {
        let outcome = self.delete.clone().map_or_else(|| Ok(TeardownReport::default()), Err);
        Box::pin(async move { outcome })
    }

    fn export<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        name: &'a ClusterName,
        kubeconfig: Option<&'a Utf8Path>,
    ) -> ProviderFuture<'a, Utf8PathBuf> {
        self.create(ctx, name, kubeconfig)
    }
}

fn summary(name: &str, status: ClusterStatus) -> ClusterSummary {
    ClusterSummary {
        name: ClusterName::parse(name).expect("cluster name"),
        status,
        resources: Vec::new(),
    }
}

#[fixture]
fn runner() -> Arc<ScriptedRunner> {
    Arc::new(ScriptedRunner::new())
}

async fn dispatch_to_string(
    command: Command,
    provider: &StubProvider,
    runner: &Arc<ScriptedRunner>,
) -> (Result<i32, CliError>, String) {
    let kubectl = Kubectl::new("kubectl", Arc::clone(runner));
    let mut out = Vec::new();
    let result = dispatch(command, provider, &kubectl, &CancellationToken::new(), &mut out).await;
    (result, String::from_utf8(out).expect("utf8"))
}

#[rstest]
#[tokio::test]
async fn list_prints_name_and_status(runner: Arc<ScriptedRunner>) {
    let provider = StubProvider {
        listing: ClusterListing {
            clusters: vec![
                summary("alpha", ClusterStatus::Ready),
                summary("beta", ClusterStatus::PartiallyProvisioned),
            ],
            incomplete: None,
        },
        ..StubProvider::default()
    };

    let (result, out) = dispatch_to_string(Command::List, &provider, &runner).await;

    assert!(matches!(result, Ok(0)), "{result:?}");
    assert_eq!(out, "alpha\tready\nbeta\tpartially-provisioned\n");
}

#[rstest]
#[tokio::test]
async fn incomplete_listing_prints_then_fails(runner: Arc<ScriptedRunner>) {
    let provider = StubProvider {
        listing: ClusterListing {
            clusters: vec![summary("alpha", ClusterStatus::Ready)],
            incomplete: Some(ProviderError::BackendUnreachable {
                resource: String::from("servers"),
                message: String::from("connection refused"),
            }),
        },
        ..StubProvider::default()
    };

    let (result, out) = dispatch_to_string(Command::List, &provider, &runner).await;

    assert!(matches!(result, Err(CliError::Incomplete(_))), "{result:?}");
    assert_eq!(out, "alpha\tready\n");
}

#[rstest]
#[tokio::test]
async fn delete_of_absent_cluster_succeeds(runner: Arc<ScriptedRunner>) {
    let provider = StubProvider {
        delete: Some(ProviderError::NotFound {
            cluster: String::from("ghost"),
        }),
        ..StubProvider::default()
    };
    let command = Command::Delete(NameArgs {
        name: String::from("ghost"),
    });

    let (result, out) = dispatch_to_string(command, &provider, &runner).await;

    assert!(matches!(result, Ok(0)), "{result:?}");
    assert!(out.contains("nothing to delete"), "{out}");
}

#[rstest]
#[tokio::test]
async fn other_delete_errors_propagate(runner: Arc<ScriptedRunner>) {
    let provider = StubProvider {
        delete: Some(ProviderError::Backend {
            resource: String::from("server dev-control-plane (7)"),
            message: String::from("boom"),
        }),
        ..StubProvider::default()
    };
    let command = Command::Delete(NameArgs {
        name: String::from("dev"),
    });

    let (result, _) = dispatch_to_string(command, &provider, &runner).await;

    assert!(matches!(result, Err(CliError::Provider(_))), "{result:?}");
}

#[rstest]
#[tokio::test]
async fn invalid_name_is_rejected_before_the_provider(runner: Arc<ScriptedRunner>) {
    let command = Command::Create(TargetArgs {
        name: String::from("Not_Valid"),
        kubeconfig: None,
    });

    let (result, out) = dispatch_to_string(command, &StubProvider::default(), &runner).await;

    assert!(
        matches!(result, Err(CliError::Provider(ProviderError::Validation { .. }))),
        "{result:?}"
    );
    assert!(out.is_empty());
}

#[rstest]
#[tokio::test]
async fn dashboard_forwards_the_dashboard_service(runner: Arc<ScriptedRunner>) {
    runner.push_success();
    let command = Command::Dashboard(DashboardArgs {
        name: String::from("dev"),
        port: 8443,
        namespace: String::from("kube-system"),
    });

    let (result, out) = dispatch_to_string(command, &StubProvider::default(), &runner).await;

    assert!(matches!(result, Ok(0)), "{result:?}");
    assert!(out.contains("http://127.0.0.1:8443/"), "{out}");
    let calls = runner.invocations();
    let call = calls.first().expect("kubectl invocation").command_string();
    assert!(
        call.ends_with("--namespace kube-system port-forward service/dashboard 8443:80"),
        "{call}"
    );
}

#[rstest]
fn write_error_prefixes_message() {
    let mut buf = Vec::new();
    write_error(&mut buf, &CliError::NonUtf8Path(String::from("/tmp/\u{fffd}")));
    let rendered = String::from_utf8(buf).expect("utf8");
    assert!(rendered.starts_with("error: kubeconfig path"), "{rendered}");
}
