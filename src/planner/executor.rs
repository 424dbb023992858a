//! Plan executor.
//!
//! Operations run class by class: every create finishes before the first
//! update is issued, and every update before the first delete. Within a
//! class, up to `concurrency` operations are in flight at once. A failed
//! operation never stops its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, OperationError};
use crate::remote::{ApiResult, ResourceApi};

use super::plan::{Operation, OperationKind, ReconciliationPlan};
use super::report::ReconciliationReport;

/// Default number of operations in flight per class.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Reason recorded for operations not issued after cancellation.
pub const SKIP_CANCELLED: &str = "cancelled";

/// Executor for reconciliation plans.
#[derive(Clone)]
pub struct Executor {
    /// Remote API client.
    api: Arc<dyn ResourceApi>,
    /// Maximum operations in flight per class.
    concurrency: usize,
    /// Per-operation time limit.
    operation_timeout: Option<Duration>,
    /// Stops issuing new operations once cancelled.
    cancel: CancellationToken,
}

impl Executor {
    /// Creates an executor over an API client.
    #[must_use]
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self {
            api,
            concurrency: DEFAULT_CONCURRENCY,
            operation_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the maximum number of operations in flight per class.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets a time limit for each operation.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Uses an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the token that cancels this executor.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Executes a plan and returns the report.
    ///
    /// Never returns early: every planned operation ends up succeeded,
    /// failed or skipped in the report.
    pub async fn execute(&self, plan: &ReconciliationPlan) -> ReconciliationReport {
        let mut report = ReconciliationReport::for_plan(plan);

        if plan.is_empty() {
            info!("Nothing to execute for {}", plan.kind);
            report.finish();
            return report;
        }

        info!(
            "Executing {} operation(s) for {} with concurrency {}",
            plan.operation_count(),
            plan.kind,
            self.concurrency
        );

        for class in [OperationKind::Create, OperationKind::Update, OperationKind::Delete] {
            let operations = plan.operations_of(class);
            if operations.is_empty() {
                continue;
            }
            let partial = self.execute_class(plan, class, operations).await;
            report.merge(partial);
        }

        report.finish();
        info!("Execution finished: {report}");
        report
    }

    /// Runs one class of operations and waits for all of them.
    ///
    /// Returns a partial report holding only this class's outcomes.
    async fn execute_class(
        &self,
        plan: &ReconciliationPlan,
        class: OperationKind,
        operations: Vec<Operation>,
    ) -> ReconciliationReport {
        debug!("Starting {} {class} operation(s)", operations.len());
        let mut report = ReconciliationReport::for_plan(plan);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut in_flight: BTreeMap<String, Operation> = BTreeMap::new();
        let mut pending = operations.into_iter();

        while let Some(operation) = pending.next() {
            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                warn!("Cancelled, not issuing {}", operation.description());
                report.record_skipped(&operation, SKIP_CANCELLED);
                for rest in pending.by_ref() {
                    report.record_skipped(&rest, SKIP_CANCELLED);
                }
                break;
            };

            debug!("Issuing {}", operation.description());
            in_flight.insert(operation.key().to_string(), operation.clone());

            let api = Arc::clone(&self.api);
            let timeout = self.operation_timeout;
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = run_operation(api.as_ref(), &operation, timeout).await;
                (operation, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((operation, outcome)) => {
                    in_flight.remove(operation.key());
                    match &outcome {
                        Ok(_) => debug!("{} succeeded", operation.description()),
                        Err(e) => error!("{} failed: {e}", operation.description()),
                    }
                    report.record(&operation, outcome);
                }
                Err(e) => error!("Worker task stopped: {e}"),
            }
        }

        // Whatever is still in flight belongs to a worker that never returned.
        for (_, operation) in in_flight {
            report.record_failure(OperationError {
                operation: operation.class(),
                kind: operation.kind(),
                key: operation.key().to_string(),
                remote_id: operation.remote_id().map(str::to_string),
                source: ApiError::Aborted {
                    message: String::from("worker stopped before reporting a result"),
                },
            });
        }

        report
    }
}

/// Runs a single operation, applying the optional time limit.
async fn run_operation(
    api: &dyn ResourceApi,
    operation: &Operation,
    timeout: Option<Duration>,
) -> ApiResult<Option<String>> {
    let Some(limit) = timeout else {
        return dispatch(api, operation).await;
    };

    tokio::time::timeout(limit, dispatch(api, operation))
        .await
        .unwrap_or_else(|_| {
            Err(ApiError::Timeout {
                after_secs: limit.as_secs(),
            })
        })
}

/// Sends an operation to the API. A delete of a missing resource succeeds.
async fn dispatch(api: &dyn ResourceApi, operation: &Operation) -> ApiResult<Option<String>> {
    match operation {
        Operation::Create(resource) => {
            let remote_id = api.create(resource).await?;
            info!("Created {} '{}' ({remote_id})", resource.kind, resource.key);
            Ok(Some(remote_id))
        }
        Operation::Update {
            kind,
            key,
            remote_id,
            patch,
        } => {
            api.update(*kind, remote_id, patch).await?;
            info!("Updated {kind} '{key}' ({patch})");
            Ok(None)
        }
        Operation::Delete {
            kind,
            key,
            remote_id,
        } => match api.delete(*kind, remote_id).await {
            Ok(()) => {
                info!("Deleted {kind} '{key}' ({remote_id})");
                Ok(None)
            }
            Err(ApiError::NotFound { .. }) => {
                info!("{kind} '{key}' was already deleted");
                Ok(None)
            }
            Err(e) => Err(e),
        },
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("concurrency", &self.concurrency)
            .field("operation_timeout", &self.operation_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
