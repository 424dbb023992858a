//! Reconciler for converging remote resources to the tenant file.
//!
//! This module joins the desired-state loader and the state fetcher, builds
//! the plan, applies the caller's conflict and confirmation policy, and hands
//! the plan to the executor.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DesiredStateLoader, GuardrailsConfig};
use crate::error::{ReconcileError, Result, SyncError};
use crate::planner::{Executor, ReconciliationPlan, ReconciliationReport};
use crate::remote::{ResourceApi, StateFetcher};
use crate::resource::{Resource, ResourceKind};

/// Caller decisions applied before a plan is executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// The caller confirmed plans that exceed the guardrails.
    pub confirmed: bool,
    /// Refuse to execute a plan with conflicts.
    pub fail_on_conflict: bool,
}

/// Reconciler for one tenant.
#[derive(Debug, Clone)]
pub struct Reconciler {
    /// Desired-state loader.
    loader: DesiredStateLoader,
    /// Current-state fetcher.
    fetcher: StateFetcher,
    /// Plan executor.
    executor: Executor,
    /// Safety gate thresholds.
    guardrails: GuardrailsConfig,
}

impl Reconciler {
    /// Creates a reconciler fetching and executing through `api`.
    #[must_use]
    pub fn new(loader: DesiredStateLoader, api: Arc<dyn ResourceApi>) -> Self {
        Self {
            loader,
            fetcher: StateFetcher::new(Arc::clone(&api)),
            executor: Executor::new(api),
            guardrails: GuardrailsConfig::default(),
        }
    }

    /// Replaces the executor (concurrency, timeout, cancellation).
    #[must_use]
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Sets the safety gate thresholds.
    #[must_use]
    pub const fn with_guardrails(mut self, guardrails: GuardrailsConfig) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Plans and executes `existing` against `desired`.
    ///
    /// No safety gate is applied here; callers check
    /// [`ReconciliationPlan::requires_confirmation`] first.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        existing: Vec<Resource>,
        desired: Vec<Resource>,
    ) -> (ReconciliationPlan, ReconciliationReport) {
        let plan = ReconciliationPlan::build(kind, existing, desired);
        let report = self.executor.execute(&plan).await;
        (plan, report)
    }

    /// Loads desired state and fetches existing state concurrently, then
    /// builds the plan.
    ///
    /// Returns `None` when the tenant file does not declare the kind.
    ///
    /// # Errors
    ///
    /// Returns a configuration or fetch error; no remote write has happened.
    pub async fn plan(&self, kind: ResourceKind) -> Result<Option<ReconciliationPlan>> {
        let (desired, existing) = tokio::try_join!(self.loader.load(kind), async {
            self.fetcher.fetch(kind).await.map_err(SyncError::from)
        })?;

        let Some(desired) = desired else {
            info!("{kind} resources are not managed by this tenant file");
            return Ok(None);
        };

        Ok(Some(ReconciliationPlan::build(kind, existing, desired)))
    }

    /// Checks the conflict policy and the safety gate.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedConflicts` if conflicts must fail the run, or
    /// `ConfirmationRequired` if the plan exceeds the guardrails without
    /// confirmation.
    pub fn check(&self, plan: &ReconciliationPlan, options: ApplyOptions) -> Result<()> {
        if plan.has_conflicts() {
            if options.fail_on_conflict {
                return Err(SyncError::Reconcile(ReconcileError::UnresolvedConflicts {
                    kind: plan.kind,
                    count: plan.conflicts.len(),
                    keys: plan.conflict_keys(),
                }));
            }
            warn!(
                "Skipping {} conflicting {} key(s): {}",
                plan.conflicts.len(),
                plan.kind,
                plan.conflict_keys()
            );
        }

        let violations = plan.guardrail_violations(&self.guardrails);
        if !violations.is_empty() {
            for violation in &violations {
                warn!("Guardrail: {violation}");
            }
            if !options.confirmed {
                return Err(SyncError::Reconcile(ReconcileError::ConfirmationRequired {
                    kind: plan.kind,
                    deletes: plan.deletes.len(),
                    existing: plan.existing_count,
                }));
            }
        }

        Ok(())
    }

    /// Executes a plan that passed [`Reconciler::check`].
    pub async fn execute(&self, plan: &ReconciliationPlan) -> ReconciliationReport {
        self.executor.execute(plan).await
    }

    /// Plans, checks and executes one kind.
    ///
    /// Returns `None` when the tenant file does not declare the kind.
    ///
    /// # Errors
    ///
    /// Returns configuration, fetch or policy errors. Failed operations are
    /// reported in the report, not as errors.
    pub async fn apply(
        &self,
        kind: ResourceKind,
        options: ApplyOptions,
    ) -> Result<Option<(ReconciliationPlan, ReconciliationReport)>> {
        let Some(plan) = self.plan(kind).await? else {
            return Ok(None);
        };

        self.check(&plan, options)?;
        let report = self.execute(&plan).await;

        if report.has_failures() {
            warn!("{} operation(s) failed for {kind}", report.failed());
        }
        Ok(Some((plan, report)))
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the drift check fails.
    pub async fn check_drift(&self, kind: ResourceKind) -> Result<Option<DriftReport>> {
        info!("Checking for {kind} drift");
        Ok(self.plan(kind).await?.map(|plan| DriftReport::from_plan(&plan)))
    }
}

/// Report of drift detection.
#[derive(Debug, serde::Serialize)]
pub struct DriftReport {
    /// Kind that was checked.
    pub kind: ResourceKind,
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Keys that would be created, updated or deleted.
    pub drifted_resources: Vec<String>,
    /// Keys that could not be matched.
    pub conflicts: Vec<String>,
    /// Number of declared resources.
    pub desired_count: usize,
    /// Number of resources on the remote side.
    pub existing_count: usize,
}

impl DriftReport {
    /// Builds a drift report from a plan.
    #[must_use]
    pub fn from_plan(plan: &ReconciliationPlan) -> Self {
        let drifted_resources = plan
            .operations()
            .iter()
            .map(|op| op.key().to_string())
            .collect();

        Self {
            kind: plan.kind,
            has_drift: !plan.is_empty(),
            drifted_resources,
            conflicts: plan.conflicts.iter().map(|c| c.key.clone()).collect(),
            desired_count: plan.desired_count,
            existing_count: plan.existing_count,
        }
    }

    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected for {}:", self.kind)?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No {} drift detected - state is converged", self.kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{ApiError, ConfigError};
    use crate::planner::OperationKind;
    use crate::remote::InMemoryApi;
    use crate::resource::Fields;
    use serde_json::json;

    const TENANT: &str = r"
tenant:
  domain: example.eu.auth0.com
apps:
  - name: A
    description: v2
  - name: C
    app_type: spa
";

    fn loader(yaml: &str) -> DesiredStateLoader {
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("tenant file should parse");
        DesiredStateLoader::from_config(Arc::new(config))
    }

    fn app(name: &str, id: &str) -> Resource {
        Resource::existing(ResourceKind::Application, name, id, Fields::new())
    }

    fn seeded() -> Arc<InMemoryApi> {
        Arc::new(InMemoryApi::new().with_resources(vec![
            app("A", "id-a").with_field("description", "v1"),
            app("B", "id-b"),
        ]))
    }

    #[tokio::test]
    async fn test_mixed_scenario_end_to_end() {
        let api = seeded();
        let reconciler = Reconciler::new(loader(TENANT), api.clone());

        let (plan, report) = reconciler
            .apply(
                ResourceKind::Application,
                ApplyOptions {
                    confirmed: true,
                    ..ApplyOptions::default()
                },
            )
            .await
            .expect("apply should succeed")
            .expect("apps are managed");

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(report.succeeded(), 3);

        let remote = api.snapshot(ResourceKind::Application);
        let names: Vec<&str> = remote.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(remote[0].field("description"), Some(&json!("v2")));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let api = seeded();
        let reconciler = Reconciler::new(loader(TENANT), api.clone());
        let options = ApplyOptions {
            confirmed: true,
            ..ApplyOptions::default()
        };

        reconciler
            .apply(ResourceKind::Application, options)
            .await
            .expect("first run");
        api.reset_calls();

        let (plan, report) = reconciler
            .apply(ResourceKind::Application, options)
            .await
            .expect("second run")
            .expect("apps are managed");

        assert!(plan.is_empty());
        assert_eq!(report.succeeded(), 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unmanaged_kind_is_skipped() {
        let reconciler = Reconciler::new(loader(TENANT), seeded());

        let outcome = reconciler
            .apply(ResourceKind::Role, ApplyOptions::default())
            .await
            .expect("apply should succeed");

        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_writes() {
        let api = Arc::new(InMemoryApi::new().with_list_failure(ApiError::network("down")));
        let reconciler = Reconciler::new(loader(TENANT), api.clone());

        let err = reconciler
            .apply(ResourceKind::Application, ApplyOptions::default())
            .await
            .expect_err("fetch failure is fatal");

        assert!(matches!(err, SyncError::Fetch(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tenant_file_aborts_before_writes() {
        let api = seeded();
        let reconciler = Reconciler::new(
            DesiredStateLoader::from_path("/nonexistent/tenant.yaml"),
            api.clone(),
        );

        let err = reconciler
            .apply(ResourceKind::Application, ApplyOptions::default())
            .await
            .expect_err("missing file is fatal");

        assert!(matches!(err, SyncError::Config(ConfigError::FileNotFound { .. })));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_desired_requires_confirmation() {
        let api = seeded();
        let reconciler = Reconciler::new(
            loader("tenant:\n  domain: example.eu.auth0.com\napps: []\n"),
            api.clone(),
        );

        let err = reconciler
            .apply(ResourceKind::Application, ApplyOptions::default())
            .await
            .expect_err("all-delete plan needs confirmation");

        match err {
            SyncError::Reconcile(ReconcileError::ConfirmationRequired { deletes, existing, .. }) => {
                assert_eq!(deletes, 2);
                assert_eq!(existing, 2);
            }
            other => panic!("expected ConfirmationRequired, got {other:?}"),
        }
        assert!(api.calls().is_empty());

        let (_, report) = reconciler
            .apply(
                ResourceKind::Application,
                ApplyOptions {
                    confirmed: true,
                    ..ApplyOptions::default()
                },
            )
            .await
            .expect("confirmed run")
            .expect("apps are managed");
        assert_eq!(report.deletes_succeeded, 2);
        assert!(api.snapshot(ResourceKind::Application).is_empty());
    }

    #[tokio::test]
    async fn test_conflicts_skipped_or_fatal() {
        let yaml = r"
tenant:
  domain: example.eu.auth0.com
apps:
  - name: app-a
  - name: app-a
  - name: app-b
";
        let api = Arc::new(InMemoryApi::new());
        let reconciler = Reconciler::new(loader(yaml), api.clone());

        let err = reconciler
            .apply(
                ResourceKind::Application,
                ApplyOptions {
                    fail_on_conflict: true,
                    ..ApplyOptions::default()
                },
            )
            .await
            .expect_err("conflicts are fatal on request");
        assert!(matches!(
            err,
            SyncError::Reconcile(ReconcileError::UnresolvedConflicts { count: 1, .. })
        ));

        let (_, report) = reconciler
            .apply(ResourceKind::Application, ApplyOptions::default())
            .await
            .expect("conflicts are skipped by default")
            .expect("apps are managed");
        assert_eq!(report.creates_succeeded, 1);
        assert_eq!(report.conflicts, vec![String::from("app-a")]);
        assert_eq!(
            api.calls(),
            vec![(OperationKind::Create, String::from("app-b"))]
        );
    }

    #[tokio::test]
    async fn test_drift_report() {
        let reconciler = Reconciler::new(loader(TENANT), seeded());

        let drift = reconciler
            .check_drift(ResourceKind::Application)
            .await
            .expect("drift check")
            .expect("apps are managed");

        assert!(!drift.is_converged());
        assert_eq!(drift.drifted_resources, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_reconcile_sets_directly() {
        let api = Arc::new(InMemoryApi::new());
        let reconciler = Reconciler::new(loader(TENANT), api.clone());

        let desired = vec![Resource::desired(ResourceKind::Role, "admin", Fields::new())];
        let (plan, report) = reconciler.reconcile(ResourceKind::Role, vec![], desired).await;

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(report.creates_succeeded, 1);
        assert!(report.created.contains_key("admin"));
    }
}
