//! Step observers and their composite.
//!
//! The journal notifies a [`StepObserver`] after every recorded step.
//! [`CompositeStepObserver`] fans one notification out to several observers.

use std::sync::Arc;

use processing_core::ExecutionStep;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Reacts to steps recorded by the journal.
///
/// Called synchronously on the append path; implementations must not block.
pub trait StepObserver: Send + Sync {
    fn on_step(&self, step: &ExecutionStep);
}

/// Observer that fans out to multiple observers in registration order.
#[derive(Default)]
pub struct CompositeStepObserver {
    observers: Vec<Arc<dyn StepObserver>>,
}

impl CompositeStepObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn StepObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn StepObserver>) {
        self.observers.push(observer);
    }
}

impl StepObserver for CompositeStepObserver {
    fn on_step(&self, step: &ExecutionStep) {
        for observer in &self.observers {
            observer.on_step(step);
        }
    }
}

/// Logs every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStepObserver;

impl StepObserver for TracingStepObserver {
    fn on_step(&self, step: &ExecutionStep) {
        if step.status.is_terminal() {
            info!(
                execution_id = %step.execution_id,
                status = %step.status,
                message = %step.message,
                "execution finished"
            );
        } else {
            debug!(execution_id = %step.execution_id, status = %step.status, "execution step");
        }
    }
}

/// Forwards terminal steps to a channel, as execution result events.
pub struct ResultChannelObserver {
    tx: mpsc::UnboundedSender<ExecutionStep>,
}

impl ResultChannelObserver {
    /// Creates the observer and the receiving end of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionStep>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StepObserver for ResultChannelObserver {
    fn on_step(&self, step: &ExecutionStep) {
        if step.status.is_terminal() {
            // A dropped receiver only means nobody listens for results.
            let _ = self.tx.send(step.clone());
        }
    }
}
