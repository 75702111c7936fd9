//! Execution lifecycle: submission, step journal, observers and timeouts.

pub mod journal;
pub mod manager;
pub mod observer;
pub mod watcher;

pub use journal::ExecutionJournal;
pub use manager::ExecutionLifecycleManager;
pub use observer::{
    CompositeStepObserver, ResultChannelObserver, StepObserver, TracingStepObserver,
};
pub use watcher::{TimeoutSweeper, TimeoutWatcher};
