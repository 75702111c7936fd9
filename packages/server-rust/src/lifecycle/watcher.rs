//! Periodic sweep that times out executions past their deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use processing_core::{AppendOutcome, ExecutionStatus};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use super::journal::ExecutionJournal;
use crate::worker::{BackgroundRunnable, BackgroundWorker};

/// Request for an out-of-band sweep; answers with the number of executions
/// timed out.
pub struct SweepNow(oneshot::Sender<usize>);

/// Appends `TimedOut` to unfinished executions whose deadline has passed.
pub struct TimeoutSweeper {
    journal: Arc<ExecutionJournal>,
}

impl TimeoutSweeper {
    #[must_use]
    pub fn new(journal: Arc<ExecutionJournal>) -> Self {
        Self { journal }
    }

    /// Runs one sweep and returns how many executions it timed out.
    ///
    /// Executions that finish concurrently keep their own terminal step.
    pub async fn sweep(&self) -> usize {
        let unfinished = match self.journal.executions().list_unfinished().await {
            Ok(executions) => executions,
            Err(err) => {
                warn!(error = %err, "cannot list unfinished executions");
                return 0;
            }
        };
        let now = self.journal.clock().now();

        let mut timed_out = 0;
        for execution in unfinished {
            if now <= execution.deadline_ms() {
                continue;
            }
            let message = format!("exceeded timeout of {}ms", execution.timeout.as_millis());
            match self
                .journal
                .append(execution.id, ExecutionStatus::TimedOut, message)
                .await
            {
                Ok(AppendOutcome::Appended(_)) => {
                    info!(execution_id = %execution.id, "execution timed out");
                    timed_out += 1;
                }
                Ok(AppendOutcome::IgnoredAfterTerminal { .. }) => {}
                Err(err) => {
                    warn!(
                        execution_id = %execution.id,
                        error = %err,
                        "cannot time out execution"
                    );
                }
            }
        }
        timed_out
    }
}

#[async_trait]
impl BackgroundRunnable for TimeoutSweeper {
    type Task = SweepNow;

    async fn run(&mut self, task: SweepNow) {
        let count = self.sweep().await;
        let _ = task.0.send(count);
    }

    async fn on_tick(&mut self) {
        self.sweep().await;
    }
}

/// Runs a [`TimeoutSweeper`] on a background worker.
pub struct TimeoutWatcher {
    worker: Mutex<BackgroundWorker<TimeoutSweeper>>,
}

impl TimeoutWatcher {
    /// Starts sweeping every `interval`.
    #[must_use]
    pub fn start(journal: Arc<ExecutionJournal>, interval: Duration) -> Self {
        Self {
            worker: Mutex::new(BackgroundWorker::start(
                TimeoutSweeper::new(journal),
                interval,
                16,
            )),
        }
    }

    /// Sweeps immediately, between ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher has been stopped.
    pub async fn sweep_now(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.worker.lock().await.submit(SweepNow(tx)).await?;
        Ok(rx.await?)
    }

    pub async fn stop(&self) {
        self.worker.lock().await.stop().await;
    }
}
