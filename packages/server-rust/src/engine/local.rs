use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use processing_core::ExecutionStatus;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{ExecutionContext, WorkloadEngine};
use crate::worker::{BackgroundRunnable, BackgroundWorker};

/// Name of the in-process engine.
pub const LOCAL_ENGINE_NAME: &str = "local";

const REAP_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// LocalRunner
// ---------------------------------------------------------------------------

/// Spawns one task per execution and reaps them on tick.
struct LocalRunner {
    jobs: JoinSet<()>,
}

impl LocalRunner {
    fn reap(&mut self) {
        while let Some(result) = self.jobs.try_join_next() {
            if let Err(err) = result {
                warn!(error = %err, "local job panicked or was aborted");
            }
        }
    }
}

async fn run_job(ctx: ExecutionContext) {
    let executable = ctx.process.definition.executable();
    let (status, message) = match executable.execute(&ctx).await {
        Ok(()) => (ExecutionStatus::Succeeded, String::new()),
        Err(err) => (ExecutionStatus::Failed, format!("{err:#}")),
    };
    debug!(execution_id = %ctx.execution.id, %status, "local job finished");
    if let Err(err) = ctx.report(status, message).await {
        warn!(execution_id = %ctx.execution.id, error = %err, "failed to report job outcome");
    }
}

#[async_trait]
impl BackgroundRunnable for LocalRunner {
    type Task = ExecutionContext;

    async fn run(&mut self, task: ExecutionContext) {
        self.jobs.spawn(run_job(task));
    }

    async fn on_tick(&mut self) {
        self.reap();
    }

    async fn shutdown(&mut self) {
        self.reap();
        if !self.jobs.is_empty() {
            warn!(jobs = self.jobs.len(), "aborting unfinished local jobs");
        }
        self.jobs.shutdown().await;
    }
}

// ---------------------------------------------------------------------------
// LocalEngine
// ---------------------------------------------------------------------------

/// In-process engine running each execution's executable on the tokio runtime.
///
/// `run` only queues the execution. The job reports `Succeeded` when the
/// executable returns `Ok` and `Failed` with the error chain otherwise.
pub struct LocalEngine {
    worker: Mutex<BackgroundWorker<LocalRunner>>,
}

impl LocalEngine {
    /// Starts the engine's worker. Must be called within a tokio runtime.
    #[must_use]
    pub fn start(capacity: usize) -> Arc<Self> {
        let runner = LocalRunner {
            jobs: JoinSet::new(),
        };
        Arc::new(Self {
            worker: Mutex::new(BackgroundWorker::start(runner, REAP_INTERVAL, capacity)),
        })
    }

    /// Stops accepting executions and aborts running jobs.
    pub async fn shutdown(&self) {
        self.worker.lock().await.stop().await;
        info!(engine = LOCAL_ENGINE_NAME, "workload engine stopped");
    }
}

#[async_trait]
impl WorkloadEngine for LocalEngine {
    fn name(&self) -> &str {
        LOCAL_ENGINE_NAME
    }

    async fn run(&self, context: ExecutionContext) -> anyhow::Result<()> {
        self.worker.lock().await.submit(context).await
    }
}
