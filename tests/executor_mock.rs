//! Executor behavior against a mocked resource API.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::Sequence;
use mockall::mock;
use serde_json::json;
use tenant_sync::error::ApiError;
use tenant_sync::planner::{Executor, OperationKind, Patch, ReconciliationPlan};
use tenant_sync::remote::{ApiResult, ResourceApi};
use tenant_sync::resource::{Fields, Resource, ResourceKind};

mock! {
    pub Api {}

    #[async_trait]
    impl ResourceApi for Api {
        async fn list(&self, kind: ResourceKind) -> ApiResult<Vec<Resource>>;
        async fn create(&self, resource: &Resource) -> ApiResult<String>;
        async fn update(&self, kind: ResourceKind, remote_id: &str, patch: &Patch) -> ApiResult<()>;
        async fn delete(&self, kind: ResourceKind, remote_id: &str) -> ApiResult<()>;
    }
}

const KIND: ResourceKind = ResourceKind::Role;

fn existing(name: &str, id: &str, description: &str) -> Resource {
    Resource::existing(KIND, name, id, Fields::new()).with_field("description", description)
}

fn desired(name: &str, description: &str) -> Resource {
    Resource::desired(KIND, name, Fields::new()).with_field("description", description)
}

#[tokio::test]
async fn test_failed_update_does_not_block_siblings() {
    let plan = ReconciliationPlan::build(
        KIND,
        vec![
            existing("admin", "rol_1", "old"),
            existing("editor", "rol_2", "old"),
            existing("viewer", "rol_3", "old"),
            existing("legacy", "rol_4", "old"),
        ],
        vec![
            desired("admin", "new"),
            desired("editor", "new"),
            desired("viewer", "new"),
        ],
    );

    let mut api = MockApi::new();
    api.expect_update()
        .withf(|_, remote_id, _| remote_id == "rol_2")
        .times(1)
        .returning(|_, _, _| Err(ApiError::request(500, "internal error")));
    api.expect_update()
        .withf(|kind, remote_id, patch| {
            *kind == KIND
                && remote_id != "rol_2"
                && patch.get("description") == Some(&json!("new"))
        })
        .times(2)
        .returning(|_, _, _| Ok(()));
    api.expect_delete()
        .withf(|kind, remote_id| *kind == KIND && remote_id == "rol_4")
        .times(1)
        .returning(|_, _| Ok(()));
    api.expect_create().never();
    api.expect_list().never();

    let report = Executor::new(Arc::new(api)).execute(&plan).await;

    assert_eq!(report.updates_succeeded, 2);
    assert_eq!(report.deletes_succeeded, 1);
    assert_eq!(report.failed(), 1);

    let failure = report.failure_for("editor").expect("editor failure recorded");
    assert_eq!(failure.operation, OperationKind::Update);
    assert_eq!(failure.remote_id.as_deref(), Some("rol_2"));
    assert_eq!(failure.source, ApiError::request(500, "internal error"));
}

#[tokio::test]
async fn test_classes_run_in_order() {
    let plan = ReconciliationPlan::build(
        KIND,
        vec![existing("admin", "rol_1", "old"), existing("legacy", "rol_2", "old")],
        vec![desired("admin", "new"), desired("auditor", "new")],
    );

    let mut seq = Sequence::new();
    let mut api = MockApi::new();
    api.expect_create()
        .withf(|resource| resource.key == "auditor" && resource.remote_id.is_none())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::from("rol_9")));
    api.expect_update()
        .withf(|_, remote_id, _| remote_id == "rol_1")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(()));
    api.expect_delete()
        .withf(|_, remote_id| remote_id == "rol_2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let report = Executor::new(Arc::new(api)).execute(&plan).await;

    assert!(!report.has_failures());
    assert_eq!(report.created.get("auditor").map(String::as_str), Some("rol_9"));
    assert_eq!(report.succeeded(), 3);
}

#[tokio::test]
async fn test_converged_plan_issues_no_calls() {
    let plan = ReconciliationPlan::build(
        KIND,
        vec![existing("admin", "rol_1", "same")],
        vec![desired("admin", "same")],
    );

    let mut api = MockApi::new();
    api.expect_create().never();
    api.expect_update().never();
    api.expect_delete().never();

    let report = Executor::new(Arc::new(api)).execute(&plan).await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.succeeded(), 0);
    assert!(report.is_complete());
}

/// An API whose create panics for one key.
struct PanickingApi;

#[async_trait]
impl ResourceApi for PanickingApi {
    async fn list(&self, _kind: ResourceKind) -> ApiResult<Vec<Resource>> {
        Ok(Vec::new())
    }

    async fn create(&self, resource: &Resource) -> ApiResult<String> {
        assert!(resource.key != "boom", "worker crashed");
        Ok(format!("rol_{}", resource.key))
    }

    async fn update(&self, _kind: ResourceKind, _remote_id: &str, _patch: &Patch) -> ApiResult<()> {
        Ok(())
    }

    async fn delete(&self, _kind: ResourceKind, _remote_id: &str) -> ApiResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_crashed_worker_is_recorded_as_failure() {
    let plan = ReconciliationPlan::build(
        KIND,
        vec![],
        vec![desired("boom", "x"), desired("fine", "x")],
    );

    let report = Executor::new(Arc::new(PanickingApi)).execute(&plan).await;

    assert_eq!(report.creates_succeeded, 1);
    assert_eq!(report.failed(), 1);
    let failure = report.failure_for("boom").expect("crash recorded");
    assert!(matches!(failure.source, ApiError::Aborted { .. }));
    assert_eq!(report.succeeded() + report.failed() + report.skipped.len(), plan.operation_count());
}
