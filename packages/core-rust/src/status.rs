//! Execution statuses and the append-only step sequence.
//!
//! An execution's status is never stored on its own: it is the status of
//! the most recent [`ExecutionStep`]. [`StepSequence`] enforces the two rules
//! every persistence adapter must uphold when appending:
//!
//! - timestamps are non-decreasing (an earlier clock reading is clamped to
//!   the previous step's time)
//! - once a terminal status is recorded, later appends are ignored

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ExecutionId;

/// Lifecycle status of an execution.
///
/// State machine: `Pending -> [Preparing] -> Running -> Succeeded | Failed | TimedOut | Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created, not yet handed to an engine.
    Pending,
    /// The engine is preparing inputs or a work directory.
    Preparing,
    /// The engine accepted the execution.
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether no further status change is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Preparing => "PREPARING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status observation for an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: u64,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    /// Milliseconds since Unix epoch.
    pub time_ms: u64,
    pub message: String,
}

/// Result of trying to append a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The step was recorded.
    Appended(ExecutionStep),
    /// The sequence already ended with a terminal step; nothing changed.
    IgnoredAfterTerminal {
        /// The terminal status that was already recorded.
        terminal: ExecutionStatus,
    },
}

impl AppendOutcome {
    /// Returns the appended step, if any.
    #[must_use]
    pub fn appended(&self) -> Option<&ExecutionStep> {
        match self {
            Self::Appended(step) => Some(step),
            Self::IgnoredAfterTerminal { .. } => None,
        }
    }
}

/// Result of a conditional append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The latest step had the expected status and the new step was recorded.
    Applied(ExecutionStep),
    /// The latest step had another status; nothing changed.
    Conflict {
        /// The latest status, or `None` for an empty sequence.
        current: Option<ExecutionStatus>,
    },
}

/// Ordered, append-only list of steps for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSequence {
    steps: Vec<ExecutionStep>,
}

impl StepSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step unless the sequence is already terminal.
    ///
    /// `time_ms` earlier than the last step's time is raised to it so the
    /// sequence stays ordered by time as well as by arrival.
    pub fn append(
        &mut self,
        id: u64,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        time_ms: u64,
        message: impl Into<String>,
    ) -> AppendOutcome {
        if let Some(last) = self.steps.last() {
            if last.status.is_terminal() {
                return AppendOutcome::IgnoredAfterTerminal {
                    terminal: last.status,
                };
            }
        }
        let floor = self.steps.last().map_or(0, |s| s.time_ms);
        let step = ExecutionStep {
            id,
            execution_id,
            status,
            time_ms: time_ms.max(floor),
            message: message.into(),
        };
        self.steps.push(step.clone());
        AppendOutcome::Appended(step)
    }

    /// Appends a step only if the latest step has status `expected`.
    ///
    /// The same terminal rule as [`Self::append`] applies, so a terminal
    /// `expected` never admits another step.
    pub fn transition(
        &mut self,
        id: u64,
        execution_id: ExecutionId,
        expected: ExecutionStatus,
        status: ExecutionStatus,
        time_ms: u64,
        message: impl Into<String>,
    ) -> TransitionOutcome {
        let current = self.current_status();
        if current != Some(expected) {
            return TransitionOutcome::Conflict { current };
        }
        match self.append(id, execution_id, status, time_ms, message) {
            AppendOutcome::Appended(step) => TransitionOutcome::Applied(step),
            AppendOutcome::IgnoredAfterTerminal { terminal } => TransitionOutcome::Conflict {
                current: Some(terminal),
            },
        }
    }

    /// Status of the latest step, or `None` for an empty sequence.
    #[must_use]
    pub fn current_status(&self) -> Option<ExecutionStatus> {
        self.steps.last().map(|s| s.status)
    }

    /// Whether the latest step is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current_status().is_some_and(ExecutionStatus::is_terminal)
    }

    /// Steps in append order.
    #[must_use]
    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
