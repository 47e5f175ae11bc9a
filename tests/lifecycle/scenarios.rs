//! BDD scenarios for the cluster lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/cluster_lifecycle.feature",
    name = "Create a ready cluster"
)]
fn scenario_create_ready(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/cluster_lifecycle.feature",
    name = "Reject a duplicate cluster name"
)]
fn scenario_duplicate_name(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/cluster_lifecycle.feature",
    name = "Keep partial failures visible"
)]
fn scenario_partial_failure(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(path = "tests/features/cluster_lifecycle.feature", name = "Delete twice")]
fn scenario_delete_twice(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/cluster_lifecycle.feature",
    name = "Export requires a ready cluster"
)]
fn scenario_export_not_ready(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}
