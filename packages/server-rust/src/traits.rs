//! Boundary traits for the collaborators the orchestration services depend on.
//!
//! In-memory implementations live in [`crate::storage`]; the HTTP role
//! authorizer lives in [`crate::auth`].

use async_trait::async_trait;
use processing_core::{
    AppendOutcome, AuthToken, Batch, BatchId, ConstraintChecker, ConstraintViolation, Execution,
    ExecutionId, ExecutionStatus, ExecutionStep, QuotaUsage, TransitionOutcome,
};
use uuid::Uuid;

use crate::definition::PluginConfiguration;
use crate::rights::RightsBinding;

/// Read access to rights bindings.
#[async_trait]
pub trait RightsStore: Send + Sync {
    /// Every binding granted to `tenant`.
    async fn bindings_for_tenant(&self, tenant: &str) -> anyhow::Result<Vec<RightsBinding>>;

    /// The binding of one process for `tenant`.
    async fn binding(
        &self,
        tenant: &str,
        process_business_id: Uuid,
    ) -> anyhow::Result<Option<RightsBinding>>;
}

/// Read access to stored plugin configurations.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn configuration(&self, business_id: Uuid)
        -> anyhow::Result<Option<PluginConfiguration>>;
}

/// Remote role-hierarchy check.
#[async_trait]
pub trait RoleAuthorizer: Send + Sync {
    /// Whether `candidate` is `required` or a role above it.
    async fn is_role_under(
        &self,
        candidate: &str,
        required: &str,
        token: &AuthToken,
    ) -> anyhow::Result<bool>;
}

/// Batch persistence.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Stores the batch and returns it flagged as persisted.
    async fn save(&self, batch: Batch) -> anyhow::Result<Batch>;

    async fn find(&self, id: BatchId) -> anyhow::Result<Option<Batch>>;
}

/// Execution and step persistence.
///
/// Implementations must serialize appends per execution and apply the
/// [`processing_core::StepSequence`] rules atomically with the read of the
/// latest step.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Stores a new execution with an initial `Pending` step at `now_ms`.
    ///
    /// Fails if an execution with the same id exists.
    async fn create(&self, execution: Execution, now_ms: u64) -> anyhow::Result<Execution>;

    async fn find(&self, id: ExecutionId) -> anyhow::Result<Option<Execution>>;

    /// Steps in append order, or `None` for an unknown execution.
    async fn steps(&self, id: ExecutionId) -> anyhow::Result<Option<Vec<ExecutionStep>>>;

    /// Appends a step. Returns `None` for an unknown execution.
    async fn append_step(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        message: String,
        now_ms: u64,
    ) -> anyhow::Result<Option<AppendOutcome>>;

    /// Appends a step only if the latest step has status `expected`, checked
    /// and applied as one atomic step. Returns `None` for an unknown
    /// execution.
    async fn transition_step(
        &self,
        id: ExecutionId,
        expected: ExecutionStatus,
        status: ExecutionStatus,
        message: String,
        now_ms: u64,
    ) -> anyhow::Result<Option<TransitionOutcome>>;

    /// The batch's execution whose latest step is `Pending`, if any.
    async fn find_pending_for_batch(&self, batch_id: BatchId)
        -> anyhow::Result<Option<Execution>>;

    /// Executions whose latest step has `status`.
    async fn list_by_status(&self, status: ExecutionStatus) -> anyhow::Result<Vec<Execution>>;

    /// Executions whose latest step is not terminal.
    async fn list_unfinished(&self) -> anyhow::Result<Vec<Execution>>;

    /// Status of the latest step, or `None` for an unknown execution.
    async fn current_status(&self, id: ExecutionId) -> anyhow::Result<Option<ExecutionStatus>> {
        Ok(self
            .steps(id)
            .await?
            .and_then(|steps| steps.last().map(|s| s.status)))
    }
}

// ---------------------------------------------------------------------------
// Quotas
// ---------------------------------------------------------------------------

/// Resources one execution holds while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaReservation {
    pub execution_id: ExecutionId,
    pub user: String,
    pub process_business_id: Uuid,
    /// Forecast size of the execution's output.
    pub bytes: u64,
}

/// Result of [`QuotaLedger::try_reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// This call took the reservation.
    Reserved,
    /// The execution id already holds a reservation. Nothing was checked or
    /// changed, and the caller does not own the existing hold.
    AlreadyHeld,
    /// The limits would be exceeded; nothing was reserved.
    Rejected(Vec<ConstraintViolation>),
}

/// Source of quota usage with atomic check-and-reserve.
///
/// Parallel executions are counted per user; cached bytes per process.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Usage the reservation would reach, without reserving anything.
    async fn projected(&self, reservation: &QuotaReservation) -> anyhow::Result<QuotaUsage>;

    /// Checks the projected usage against `limits` and reserves it if no
    /// constraint is violated, as one atomic step.
    ///
    /// Only a caller that got [`ReserveOutcome::Reserved`] may release the
    /// reservation on failure.
    async fn try_reserve(
        &self,
        reservation: QuotaReservation,
        limits: &ConstraintChecker<QuotaUsage>,
    ) -> anyhow::Result<ReserveOutcome>;

    /// Releases the execution's parallel slot. Cached bytes are released too
    /// unless `keep_cached`.
    async fn release(&self, execution_id: ExecutionId, keep_cached: bool) -> anyhow::Result<()>;

    /// Releases cached bytes kept after a successful execution.
    ///
    /// Returns whether anything was held.
    async fn evict_cached(&self, execution_id: ExecutionId) -> anyhow::Result<bool>;
}
