//! Execution lifecycle manager: submission, dispatch and step queries.

use std::sync::Arc;
use std::time::Duration;

use processing_core::{
    AppendOutcome, AuthToken, Batch, Execution, ExecutionId, ExecutionRequest, ExecutionStatus,
    ExecutionStep, TransitionOutcome,
};
use tracing::{debug, error, info, warn};

use super::journal::ExecutionJournal;
use crate::catalog::{Process, ProcessCatalog};
use crate::config::ProcessingConfig;
use crate::engine::{ExecutionContext, WorkloadEngineRegistry};
use crate::error::{CatalogError, LifecycleError, SubmitError};
use crate::traits::{BatchRepository, QuotaReservation, ReserveOutcome};

const SUBMISSIONS_TOTAL: &str = "processing_submissions_total";

fn count_submission(outcome: &'static str) {
    metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

fn duplicate_execution(execution_id: ExecutionId) -> SubmitError {
    count_submission("duplicate_execution");
    SubmitError::DuplicateExecution { execution_id }
}

fn into_submit_error(err: LifecycleError) -> SubmitError {
    match err {
        LifecycleError::Storage(err) => SubmitError::Storage(err),
        other => SubmitError::Storage(other.into()),
    }
}

/// How a dispatch attempt ended.
enum Handoff {
    Dispatched(Execution),
    /// Another caller moved the execution out of `Pending` first.
    Claimed {
        execution: Execution,
        current: Option<ExecutionStatus>,
    },
}

/// Accepts batches, creates executions and hands them to engines.
///
/// Status only changes through steps appended via the journal. The manager
/// exposes each execution's deadline but does not enforce it; see
/// [`super::TimeoutWatcher`].
pub struct ExecutionLifecycleManager {
    catalog: Arc<ProcessCatalog>,
    engines: Arc<WorkloadEngineRegistry>,
    batches: Arc<dyn BatchRepository>,
    journal: Arc<ExecutionJournal>,
    dispatch_timeout: Duration,
}

impl ExecutionLifecycleManager {
    #[must_use]
    pub fn new(
        catalog: Arc<ProcessCatalog>,
        engines: Arc<WorkloadEngineRegistry>,
        batches: Arc<dyn BatchRepository>,
        journal: Arc<ExecutionJournal>,
        config: &ProcessingConfig,
    ) -> Self {
        Self {
            catalog,
            engines,
            batches,
            journal,
            dispatch_timeout: config.dispatch_timeout(),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submits a batch for execution.
    ///
    /// Resolves the batch's process, checks rights and quotas, creates a
    /// `Pending` execution and dispatches it. A batch that already has a
    /// `Pending` execution (a retry after [`SubmitError::EngineUnavailable`])
    /// re-dispatches that execution instead of creating another one.
    ///
    /// Dispatch failures do not fail the submission: the execution is
    /// returned and its steps end with `Failed`.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::ProcessNotFound`] if the process is missing, inactive
    ///   or not visible to the batch's tenant and role
    /// - [`SubmitError::ConstraintViolated`] with every rights and quota violation
    /// - [`SubmitError::EngineUnavailable`] if the process's engine is not
    ///   registered; the execution stays `Pending`
    /// - [`SubmitError::DuplicateExecution`] if the requested execution id is
    ///   already in use
    /// - [`SubmitError::Storage`] if a store fails
    pub async fn submit(
        &self,
        batch: Batch,
        request: ExecutionRequest,
        token: &AuthToken,
    ) -> Result<Execution, SubmitError> {
        let process = self.resolve_process(&batch, token).await?;

        if let Some(pending) = self
            .journal
            .executions()
            .find_pending_for_batch(batch.id)
            .await?
        {
            debug!(
                batch_id = %batch.id,
                execution_id = %pending.id,
                "re-dispatching pending execution"
            );
            return match self.dispatch(&process, pending, batch).await? {
                Handoff::Dispatched(execution) => Ok(execution),
                Handoff::Claimed { execution, .. } => {
                    debug!(
                        execution_id = %execution.id,
                        "pending execution already dispatched by another caller"
                    );
                    Ok(execution)
                }
            };
        }

        let execution_id = match request.execution_id {
            Some(id) => {
                if self.journal.executions().find(id).await?.is_some() {
                    return Err(duplicate_execution(id));
                }
                id
            }
            None => ExecutionId::random(),
        };
        let input_bytes = batch.total_input_bytes();
        let reservation = QuotaReservation {
            execution_id,
            user: batch.user.clone(),
            process_business_id: process.business_id,
            bytes: process.size_forecast().expected_result_size_in_bytes(input_bytes),
        };

        let mut violations = process.batch_checker().check(&batch);
        let quota_checker = process.quota_checker();
        let quotas = self.journal.quotas();
        if violations.is_empty() {
            match quotas.try_reserve(reservation.clone(), &quota_checker).await? {
                ReserveOutcome::Reserved => {}
                // Held by a concurrent submission with the same id; not ours to release.
                ReserveOutcome::AlreadyHeld => return Err(duplicate_execution(execution_id)),
                ReserveOutcome::Rejected(quota_violations) => violations = quota_violations,
            }
        } else {
            let projected = quotas.projected(&reservation).await?;
            violations.extend(quota_checker.check(&projected));
        }
        if !violations.is_empty() {
            info!(
                batch_id = %batch.id,
                process = %process.name,
                violations = violations.len(),
                "batch rejected by constraints"
            );
            count_submission("constraint_violated");
            return Err(SubmitError::ConstraintViolated { violations });
        }

        let created = self
            .create_execution(&process, batch, request, execution_id)
            .await;
        let (execution, batch) = match created {
            Ok(created) => created,
            Err(err) => {
                if let Err(release_err) = quotas.release(execution_id, false).await {
                    warn!(
                        %execution_id,
                        error = %release_err,
                        "failed to release quota after storage error"
                    );
                }
                return Err(err);
            }
        };
        match self.dispatch(&process, execution, batch).await? {
            Handoff::Dispatched(execution) | Handoff::Claimed { execution, .. } => Ok(execution),
        }
    }

    /// Resolves the batch's process, collapsing every not-runnable outcome
    /// into [`SubmitError::ProcessNotFound`].
    async fn resolve_process(
        &self,
        batch: &Batch,
        token: &AuthToken,
    ) -> Result<Process, SubmitError> {
        let business_id = batch.process_business_id;
        let not_found = || {
            count_submission("process_not_found");
            SubmitError::ProcessNotFound { business_id }
        };
        match self.catalog.find_for_batch(batch, token).await {
            Ok(Some(process)) if process.active => Ok(process),
            Ok(Some(process)) => {
                debug!(batch_id = %batch.id, process = %process.name, "process is inactive");
                Err(not_found())
            }
            Ok(None) => Err(not_found()),
            Err(CatalogError::RightsConfigurationNotFound { business_id }) => {
                error!(
                    batch_id = %batch.id,
                    business_id = %business_id,
                    "rights binding references a missing process configuration"
                );
                Err(not_found())
            }
            Err(CatalogError::Storage(err)) => Err(SubmitError::Storage(err)),
        }
    }

    async fn create_execution(
        &self,
        process: &Process,
        batch: Batch,
        request: ExecutionRequest,
        execution_id: ExecutionId,
    ) -> Result<(Execution, Batch), SubmitError> {
        let batch = self.batches.save(batch).await?;
        let now = self.journal.clock().now();
        let execution = Execution {
            id: execution_id,
            batch_id: batch.id,
            correlation_id: request
                .correlation_id
                .unwrap_or_else(|| execution_id.to_string()),
            batch_correlation_id: batch.correlation_id.clone(),
            tenant: batch.tenant.clone(),
            user: batch.user.clone(),
            process_business_id: process.business_id,
            input_files: request.input_files,
            timeout: process
                .duration_forecast()
                .expected_running_duration(batch.total_input_bytes()),
            created_at_ms: now,
            persisted: false,
        };
        let execution = self.journal.executions().create(execution, now).await?;
        info!(
            batch_id = %batch.id,
            execution_id = %execution.id,
            process = %process.name,
            "execution created"
        );
        Ok((execution, batch))
    }

    /// Hands a `Pending` execution to its engine.
    ///
    /// `Running` is recorded before the hand-off so the engine's own steps
    /// always follow it. Recording it is conditional on the execution still
    /// being `Pending`, so concurrent dispatches run the engine once.
    async fn dispatch(
        &self,
        process: &Process,
        execution: Execution,
        batch: Batch,
    ) -> Result<Handoff, SubmitError> {
        let engine_name = process.engine_name();
        let Some(engine) = self.engines.find_by_name(engine_name) else {
            warn!(
                execution_id = %execution.id,
                engine = %engine_name,
                "workload engine unavailable, execution left pending"
            );
            count_submission("engine_unavailable");
            return Err(SubmitError::EngineUnavailable {
                execution_id: execution.id,
                engine: engine_name.to_string(),
            });
        };
        debug!(execution_id = %execution.id, engine = %engine_name, "dispatching execution");

        let claimed = self
            .journal
            .transition(
                execution.id,
                ExecutionStatus::Pending,
                ExecutionStatus::Running,
                format!("handed off to engine {engine_name}"),
            )
            .await
            .map_err(into_submit_error)?;
        if let TransitionOutcome::Conflict { current } = claimed {
            count_submission("already_dispatched");
            return Ok(Handoff::Claimed { execution, current });
        }

        let context = ExecutionContext {
            execution: execution.clone(),
            batch,
            process: process.clone(),
            reporter: self.journal.clone(),
        };
        let outcome = tokio::time::timeout(self.dispatch_timeout, engine.run(context)).await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("dispatch failed: {err:#}")),
            Err(_) => Some(format!(
                "dispatch timed out after {}ms",
                self.dispatch_timeout.as_millis()
            )),
        };
        match failure {
            None => count_submission("dispatched"),
            Some(message) => {
                warn!(
                    execution_id = %execution.id,
                    engine = %engine_name,
                    reason = %message,
                    "dispatch failed"
                );
                self.journal
                    .append(execution.id, ExecutionStatus::Failed, message)
                    .await
                    .map_err(into_submit_error)?;
                count_submission("dispatch_failed");
            }
        }
        Ok(Handoff::Dispatched(execution))
    }

    /// Re-dispatches a `Pending` execution, for example once its engine has
    /// registered.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::ExecutionNotFound`] / [`LifecycleError::BatchNotFound`]
    /// - [`LifecycleError::NotPending`] if the execution already moved on
    /// - [`LifecycleError::Dispatch`] with the submission error otherwise
    pub async fn dispatch_pending(
        &self,
        execution_id: ExecutionId,
        token: &AuthToken,
    ) -> Result<Execution, LifecycleError> {
        let executions = self.journal.executions();
        let execution = executions
            .find(execution_id)
            .await?
            .ok_or(LifecycleError::ExecutionNotFound(execution_id))?;
        let status = executions
            .current_status(execution_id)
            .await?
            .ok_or(LifecycleError::ExecutionNotFound(execution_id))?;
        let not_pending = |status| LifecycleError::NotPending {
            execution_id,
            status,
        };
        if status != ExecutionStatus::Pending {
            return Err(not_pending(status));
        }
        let batch = self
            .batches
            .find(execution.batch_id)
            .await?
            .ok_or(LifecycleError::BatchNotFound(execution_id))?;
        let process = self.resolve_process(&batch, token).await?;
        match self.dispatch(&process, execution, batch).await? {
            Handoff::Dispatched(execution) => Ok(execution),
            Handoff::Claimed {
                current: Some(status),
                ..
            } => Err(not_pending(status)),
            Handoff::Claimed { current: None, .. } => {
                Err(LifecycleError::ExecutionNotFound(execution_id))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Steps and queries
    // -----------------------------------------------------------------------

    /// Appends a step; see [`ExecutionJournal::append`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ExecutionNotFound`] for an unknown execution.
    pub async fn append_step(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        message: impl Into<String>,
    ) -> Result<AppendOutcome, LifecycleError> {
        self.journal.append(execution_id, status, message).await
    }

    /// Status of the latest step.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the repository fails.
    pub async fn current_status(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionStatus>, LifecycleError> {
        Ok(self.journal.executions().current_status(execution_id).await?)
    }

    /// Steps in append order.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the repository fails.
    pub async fn steps(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Vec<ExecutionStep>>, LifecycleError> {
        Ok(self.journal.executions().steps(execution_id).await?)
    }

    /// Creation time plus timeout, in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the repository fails.
    pub async fn deadline(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<u64>, LifecycleError> {
        Ok(self
            .journal
            .executions()
            .find(execution_id)
            .await?
            .map(|e| e.deadline_ms()))
    }

    /// Executions still waiting for an engine.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the repository fails.
    pub async fn pending_executions(&self) -> Result<Vec<Execution>, LifecycleError> {
        Ok(self
            .journal
            .executions()
            .list_by_status(ExecutionStatus::Pending)
            .await?)
    }

    /// Frees the cache quota a succeeded execution's output still holds.
    ///
    /// Returns whether anything was held.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the ledger fails.
    pub async fn evict_cached_output(
        &self,
        execution_id: ExecutionId,
    ) -> Result<bool, LifecycleError> {
        Ok(self.journal.quotas().evict_cached(execution_id).await?)
    }
}
