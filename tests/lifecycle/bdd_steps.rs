//! BDD step definitions for the cluster lifecycle.

use devkube::hetzner::labels;
use devkube::test_support::script_k3s_bootstrap;
use devkube::{ClusterName, Kubeconfig, Provider, ProviderError};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{LifecycleContext, Outcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn cluster(name: &str) -> Result<ClusterName, StepError> {
    Ok(ClusterName::parse(name)?)
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

const fn error_kind(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::AlreadyExists { .. } => "already-exists",
        ProviderError::NotFound { .. } => "not-found",
        ProviderError::NotReady { .. } => "not-ready",
        ProviderError::BackendUnreachable { .. } => "backend-unreachable",
        ProviderError::ProvisioningFailed { .. } => "provisioning-failed",
        ProviderError::Canceled { .. } => "canceled",
        ProviderError::Backend { .. } => "backend",
        ProviderError::Kubeconfig(_) => "kubeconfig",
        ProviderError::Validation { .. } => "validation",
        ProviderError::Config(_) => "config",
    }
}

#[given("an empty cloud")]
fn empty_cloud(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
}

#[given("the k3s bootstrap is scripted for \"{nodes}\" nodes")]
fn bootstrap_scripted(lifecycle_context: LifecycleContext, nodes: u8) -> LifecycleContext {
    script_k3s_bootstrap(&lifecycle_context.runner, nodes);
    lifecycle_context
}

#[given("clusters have \"{nodes}\" nodes")]
fn clusters_have_nodes(mut lifecycle_context: LifecycleContext, nodes: u8) -> LifecycleContext {
    lifecycle_context.config.nodes = nodes;
    lifecycle_context
}

#[given("attaching server \"{server}\" fails")]
fn attach_fails(lifecycle_context: LifecycleContext, server: String) -> LifecycleContext {
    lifecycle_context.cloud.fail_attach(&server);
    lifecycle_context
}

#[given("a network claimed by cluster \"{name}\"")]
fn network_claimed(
    lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    lifecycle_context
        .cloud
        .seed_network("devkube", labels::network_labels(&cluster(&name)?));
    Ok(lifecycle_context)
}

#[given("an existing ready cluster \"{name}\"")]
fn existing_cluster(
    mut lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    script_k3s_bootstrap(&lifecycle_context.runner, lifecycle_context.config.nodes);
    let provider = lifecycle_context.provider();
    let target = lifecycle_context.kubeconfig.clone();
    let cluster_name = cluster(&name)?;
    runtime()?.block_on(async {
        provider
            .create(&CancellationToken::new(), &cluster_name, Some(&target))
            .await
    })?;
    lifecycle_context.baseline_mutations = lifecycle_context.cloud.mutations().len();
    Ok(lifecycle_context)
}

#[when("I create cluster \"{name}\"")]
fn create_cluster(
    mut lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    let provider = lifecycle_context.provider();
    let target = lifecycle_context.kubeconfig.clone();
    let cluster_name = cluster(&name)?;
    let result = runtime()?.block_on(async {
        provider
            .create(&CancellationToken::new(), &cluster_name, Some(&target))
            .await
    });
    lifecycle_context.outcome = Some(result.map_or_else(Outcome::Failed, Outcome::Written));
    Ok(lifecycle_context)
}

#[when("I delete cluster \"{name}\"")]
fn delete_cluster(
    mut lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    let provider = lifecycle_context.provider();
    let cluster_name = cluster(&name)?;
    let result = runtime()?
        .block_on(async { provider.delete(&CancellationToken::new(), &cluster_name).await });
    lifecycle_context.outcome = Some(result.map_or_else(Outcome::Failed, Outcome::Deleted));
    Ok(lifecycle_context)
}

#[when("I export cluster \"{name}\"")]
fn export_cluster(
    mut lifecycle_context: LifecycleContext,
    name: String,
) -> Result<LifecycleContext, StepError> {
    let provider = lifecycle_context.provider();
    let target = lifecycle_context.kubeconfig.clone();
    let cluster_name = cluster(&name)?;
    let result = runtime()?.block_on(async {
        provider
            .export(&CancellationToken::new(), &cluster_name, Some(&target))
            .await
    });
    lifecycle_context.outcome = Some(result.map_or_else(Outcome::Failed, Outcome::Written));
    Ok(lifecycle_context)
}

#[then("the operation succeeds")]
fn operation_succeeds(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match &lifecycle_context.outcome {
        Some(Outcome::Written(_) | Outcome::Deleted(_)) => Ok(()),
        Some(Outcome::Failed(err)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the error kind is \"{kind}\"")]
fn error_kind_is(lifecycle_context: &LifecycleContext, kind: String) -> Result<(), StepError> {
    let Some(Outcome::Failed(err)) = &lifecycle_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if error_kind(err) == kind {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {kind}, got {}: {err}",
            error_kind(err)
        )))
    }
}

#[then("cluster \"{name}\" is listed as \"{status}\"")]
fn cluster_listed_as(
    lifecycle_context: &LifecycleContext,
    name: String,
    status: String,
) -> Result<(), StepError> {
    let provider = lifecycle_context.provider();
    let listing = runtime()?.block_on(async { provider.list(&CancellationToken::new()).await })?;
    let cluster_name = cluster(&name)?;
    let summary = listing
        .find(&cluster_name)
        .ok_or_else(|| StepError::Assertion(format!("cluster {name} is not listed")))?;
    if summary.status.as_str() == status {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {status}, listed as {}",
            summary.status
        )))
    }
}

#[then("every left-behind resource is listed under \"{name}\"")]
fn left_behind_listed(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    let Some(Outcome::Failed(err)) = &lifecycle_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if err.left_behind().is_empty() {
        return Err(StepError::Assertion(String::from(
            "failure should report left-behind resources",
        )));
    }
    let provider = lifecycle_context.provider();
    let listing = runtime()?.block_on(async { provider.list(&CancellationToken::new()).await })?;
    let cluster_name = cluster(&name)?;
    let summary = listing
        .find(&cluster_name)
        .ok_or_else(|| StepError::Assertion(format!("cluster {name} is not listed")))?;
    match err
        .left_behind()
        .iter()
        .find(|resource| !summary.resources.contains(resource))
    {
        None => Ok(()),
        Some(missing) => Err(StepError::Assertion(format!(
            "{missing} is not discoverable through the listing"
        ))),
    }
}

#[then("the kubeconfig names context \"{name}\"")]
fn kubeconfig_names_context(
    lifecycle_context: &LifecycleContext,
    name: String,
) -> Result<(), StepError> {
    let raw = std::fs::read_to_string(&lifecycle_context.kubeconfig)
        .map_err(|err| StepError::Assertion(format!("kubeconfig not written: {err}")))?;
    let kubeconfig =
        Kubeconfig::from_yaml(&raw).map_err(|err| StepError::Assertion(err.to_string()))?;
    if kubeconfig.current_context == name {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected context {name}, got {}",
            kubeconfig.current_context
        )))
    }
}

#[then("no kubeconfig is written")]
fn no_kubeconfig(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if lifecycle_context.kubeconfig.exists() {
        Err(StepError::Assertion(String::from(
            "kubeconfig should not be written",
        )))
    } else {
        Ok(())
    }
}

#[then("no further cloud mutations were made")]
fn no_further_mutations(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let mutations = lifecycle_context.cloud.mutations();
    if mutations.len() == lifecycle_context.baseline_mutations {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected mutations: {:?}",
            mutations.get(lifecycle_context.baseline_mutations..)
        )))
    }
}

#[then("no managed resources remain")]
fn nothing_remains(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let servers = lifecycle_context.cloud.servers().len();
    let networks = lifecycle_context.cloud.networks().len();
    if servers == 0 && networks == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{servers} servers and {networks} networks remain"
        )))
    }
}

