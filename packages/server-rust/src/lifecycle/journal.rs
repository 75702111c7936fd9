use std::sync::Arc;

use async_trait::async_trait;
use processing_core::{
    AppendOutcome, ClockSource, ExecutionId, ExecutionStatus, ExecutionStep, TransitionOutcome,
};
use tracing::{debug, warn};

use super::observer::StepObserver;
use crate::engine::StepReporter;
use crate::error::LifecycleError;
use crate::traits::{ExecutionRepository, QuotaLedger};

/// The single write path for execution steps.
///
/// Appends go through the repository's atomic append. A recorded terminal
/// step releases the execution's quota reservation; `Succeeded` keeps the
/// cached bytes. Every recorded step is passed to the observer.
pub struct ExecutionJournal {
    executions: Arc<dyn ExecutionRepository>,
    quotas: Arc<dyn QuotaLedger>,
    observer: Arc<dyn StepObserver>,
    clock: Arc<dyn ClockSource>,
}

impl ExecutionJournal {
    #[must_use]
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        quotas: Arc<dyn QuotaLedger>,
        observer: Arc<dyn StepObserver>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            executions,
            quotas,
            observer,
            clock,
        }
    }

    #[must_use]
    pub fn executions(&self) -> &Arc<dyn ExecutionRepository> {
        &self.executions
    }

    #[must_use]
    pub fn quotas(&self) -> &Arc<dyn QuotaLedger> {
        &self.quotas
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn ClockSource> {
        &self.clock
    }

    /// Appends a step at the current clock time.
    ///
    /// An append after a terminal step changes nothing and is reported as
    /// [`AppendOutcome::IgnoredAfterTerminal`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ExecutionNotFound`] for an unknown execution
    /// and [`LifecycleError::Storage`] if the repository fails.
    pub async fn append(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        message: impl Into<String>,
    ) -> Result<AppendOutcome, LifecycleError> {
        let outcome = self
            .executions
            .append_step(execution_id, status, message.into(), self.clock.now())
            .await?
            .ok_or(LifecycleError::ExecutionNotFound(execution_id))?;

        match &outcome {
            AppendOutcome::Appended(step) => self.recorded(step).await,
            AppendOutcome::IgnoredAfterTerminal { terminal } => {
                debug!(
                    execution_id = %execution_id,
                    %status,
                    terminal = %terminal,
                    "ignoring step after terminal status"
                );
            }
        }
        Ok(outcome)
    }

    /// Appends a step only if the execution's latest status is `expected`.
    ///
    /// Of several concurrent callers expecting the same status, at most one
    /// sees [`TransitionOutcome::Applied`].
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ExecutionNotFound`] for an unknown execution
    /// and [`LifecycleError::Storage`] if the repository fails.
    pub async fn transition(
        &self,
        execution_id: ExecutionId,
        expected: ExecutionStatus,
        status: ExecutionStatus,
        message: impl Into<String>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let outcome = self
            .executions
            .transition_step(execution_id, expected, status, message.into(), self.clock.now())
            .await?
            .ok_or(LifecycleError::ExecutionNotFound(execution_id))?;
        if let TransitionOutcome::Applied(step) = &outcome {
            self.recorded(step).await;
        }
        Ok(outcome)
    }

    async fn recorded(&self, step: &ExecutionStep) {
        if step.status.is_terminal() {
            let execution_id = step.execution_id;
            let keep_cached = step.status == ExecutionStatus::Succeeded;
            if let Err(err) = self.quotas.release(execution_id, keep_cached).await {
                warn!(%execution_id, error = %err, "failed to release quota");
            }
        }
        self.observer.on_step(step);
    }
}

#[async_trait]
impl StepReporter for ExecutionJournal {
    async fn report(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        message: String,
    ) -> anyhow::Result<AppendOutcome> {
        Ok(self.append(execution_id, status, message).await?)
    }
}
