//! Executable handles and their composition into named stages.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::engine::ExecutionContext;

/// The work a process performs for one execution.
///
/// Engines call `execute` and turn its outcome into a terminal step.
#[async_trait]
pub trait Executable: Send + Sync {
    /// Runs the work to completion.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the execution failed.
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// FnStage
// ---------------------------------------------------------------------------

/// Adapts a synchronous closure into an [`Executable`].
pub struct FnStage<F>(pub F);

#[async_trait]
impl<F> Executable for FnStage<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Named executables run in order, with an optional error handler.
///
/// The first failing stage stops the chain. The handler then runs and the
/// stage's error, annotated with the stage name, is returned. A failure of
/// the handler itself is only logged.
pub struct Stages {
    stages: Vec<(String, Arc<dyn Executable>)>,
    on_error: Option<Arc<dyn Executable>>,
}

impl Stages {
    /// Starts a chain with its first stage.
    #[must_use]
    pub fn first(name: impl Into<String>, stage: Arc<dyn Executable>) -> Self {
        Self {
            stages: vec![(name.into(), stage)],
            on_error: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn then(mut self, name: impl Into<String>, stage: Arc<dyn Executable>) -> Self {
        self.stages.push((name.into(), stage));
        self
    }

    /// Sets the handler run after a failing stage.
    #[must_use]
    pub fn on_error(mut self, handler: Arc<dyn Executable>) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[async_trait]
impl Executable for Stages {
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        for (name, stage) in &self.stages {
            debug!(execution_id = %ctx.execution.id, stage = %name, "running stage");
            if let Err(err) = stage.execute(ctx).await {
                if let Some(handler) = &self.on_error {
                    if let Err(handler_err) = handler.execute(ctx).await {
                        warn!(
                            execution_id = %ctx.execution.id,
                            stage = %name,
                            error = %handler_err,
                            "error handler failed"
                        );
                    }
                }
                return Err(err.context(format!("stage '{name}' failed")));
            }
        }
        Ok(())
    }
}
