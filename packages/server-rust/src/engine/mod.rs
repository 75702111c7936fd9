//! Workload engines: the pluggable backends that run executions.

pub mod local;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use processing_core::{AppendOutcome, Batch, Execution, ExecutionId, ExecutionStatus};

use crate::catalog::Process;

pub use local::{LocalEngine, LOCAL_ENGINE_NAME};
pub use registry::WorkloadEngineRegistry;

// ---------------------------------------------------------------------------
// StepReporter
// ---------------------------------------------------------------------------

/// Channel through which engines record progress on an execution.
#[async_trait]
pub trait StepReporter: Send + Sync {
    /// Appends a step to the execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is unknown or storage fails.
    async fn report(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        message: String,
    ) -> anyhow::Result<AppendOutcome>;
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Everything an engine needs to run one execution.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution: Execution,
    pub batch: Batch,
    pub process: Process,
    pub reporter: Arc<dyn StepReporter>,
}

impl ExecutionContext {
    /// Reports a step for this context's execution.
    ///
    /// # Errors
    ///
    /// Propagates the reporter's error.
    pub async fn report(
        &self,
        status: ExecutionStatus,
        message: impl Into<String> + Send,
    ) -> anyhow::Result<AppendOutcome> {
        self.reporter
            .report(self.execution.id, status, message.into())
            .await
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution.id)
            .field("batch_id", &self.batch.id)
            .field("process", &self.process.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// WorkloadEngine
// ---------------------------------------------------------------------------

/// A backend that runs executions.
///
/// `run` hands the execution off and returns; it does not wait for the work
/// to finish. Later progress is reported through the context's reporter.
#[async_trait]
pub trait WorkloadEngine: Send + Sync {
    /// Unique name processes use to select this engine.
    fn name(&self) -> &str;

    /// Accepts an execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot take the execution.
    async fn run(&self, context: ExecutionContext) -> anyhow::Result<()>;

    /// Registers this engine under its own name.
    fn self_register_in_repo(self: Arc<Self>, registry: &WorkloadEngineRegistry)
    where
        Self: Sized + 'static,
    {
        registry.register(self);
    }
}
