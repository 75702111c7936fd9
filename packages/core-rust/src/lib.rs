//! Processing core: batches, executions, step sequences, the constraint
//! engine and resource forecasts.

pub mod clock;
pub mod constraint;
pub mod context;
pub mod forecast;
pub mod status;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use constraint::{Constraint, ConstraintChecker, ConstraintViolation, QuotaLimits, QuotaUsage};
pub use context::AuthToken;
pub use forecast::{DurationForecast, ForecastParseError, SizeForecast};
pub use status::{
    AppendOutcome, ExecutionStatus, ExecutionStep, StepSequence, TransitionOutcome,
};
pub use types::{
    Batch, BatchId, DataType, Execution, ExecutionId, ExecutionParameterDescriptor,
    ExecutionParameterType, ExecutionParameterValue, ExecutionRequest, FileStatsByDataset,
    InputFile,
};
