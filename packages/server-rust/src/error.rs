//! Error types surfaced by the orchestration services.
//!
//! Not-found conditions are `Option`s, not errors. The enums here cover the
//! outcomes a caller has to act on: rejections, retriable engine gaps,
//! data-integrity problems on direct lookups, and storage failures.

use processing_core::{ConstraintViolation, ExecutionId, ExecutionStatus};
use uuid::Uuid;

/// Errors from the process catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A rights binding references a process definition that does not exist.
    #[error("rights configuration not found for process {business_id}")]
    RightsConfigurationNotFound { business_id: Uuid },
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Outcome of a rejected or failed submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// No process visible to the batch's tenant and role matches its business id.
    ///
    /// Covers both "does not exist" and "not entitled" so callers cannot
    /// probe entitlements.
    #[error("process {business_id} not found")]
    ProcessNotFound { business_id: Uuid },
    /// One or more constraints rejected the batch. Carries every violation.
    #[error("batch violates {} constraint(s)", violations.len())]
    ConstraintViolated { violations: Vec<ConstraintViolation> },
    /// The named engine is not registered. The execution stays `Pending`
    /// and can be re-dispatched once the engine is available.
    #[error("workload engine {engine:?} unavailable for execution {execution_id}")]
    EngineUnavailable {
        execution_id: ExecutionId,
        engine: String,
    },
    /// The requested execution id is already in use.
    #[error("execution {execution_id} already exists")]
    DuplicateExecution { execution_id: ExecutionId },
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Errors from step and status operations on an existing execution.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),
    /// Only `Pending` executions can be (re-)dispatched.
    #[error("execution {execution_id} is {status}, not pending")]
    NotPending {
        execution_id: ExecutionId,
        status: ExecutionStatus,
    },
    #[error("batch for execution {0} not found")]
    BatchNotFound(ExecutionId),
    /// Re-dispatch of a pending execution failed like a submission would.
    #[error(transparent)]
    Dispatch(#[from] SubmitError),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
