//! Shared fixtures for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use processing_core::{
    AppendOutcome, Batch, BatchId, DataType, DurationForecast, Execution, ExecutionId,
    ExecutionParameterDescriptor, ExecutionParameterValue, ExecutionStatus, ExecutionStep,
    FileStatsByDataset, QuotaLimits, SizeForecast,
};
use uuid::Uuid;

use crate::catalog::Process;
use crate::definition::{Executable, FnStage, ProcessDefinition};
use crate::engine::{ExecutionContext, StepReporter};

/// Batch for tenant `project1` drawing 100 bytes from each of `D1` and `D2`,
/// with parameter `level=2`.
pub(crate) fn make_batch() -> Batch {
    let stats = FileStatsByDataset {
        files_count: 1,
        total_bytes: 100,
    };
    Batch {
        id: BatchId::random(),
        correlation_id: "batch-corr".to_string(),
        process_business_id: Uuid::new_v4(),
        process_name: "proc".to_string(),
        tenant: "project1".to_string(),
        user: "user@example.com".to_string(),
        user_role: "REGISTERED_USER".to_string(),
        parameters: vec![ExecutionParameterValue {
            name: "level".to_string(),
            value: "2".to_string(),
        }],
        files_stats_by_dataset: BTreeMap::from([
            ("D1".to_string(), stats),
            ("D2".to_string(), stats),
        ]),
        persisted: false,
    }
}

pub(crate) fn make_execution(batch_id: BatchId) -> Execution {
    Execution {
        id: ExecutionId::random(),
        batch_id,
        correlation_id: "exec-corr".to_string(),
        batch_correlation_id: "batch-corr".to_string(),
        tenant: "project1".to_string(),
        user: "user@example.com".to_string(),
        process_business_id: Uuid::new_v4(),
        input_files: Vec::new(),
        timeout: Duration::from_secs(60),
        created_at_ms: 0,
        persisted: false,
    }
}

// ---------------------------------------------------------------------------
// StaticDefinition
// ---------------------------------------------------------------------------

/// Definition with fixed attributes and a configurable executable.
pub(crate) struct StaticDefinition {
    engine: String,
    parameters: Vec<ExecutionParameterDescriptor>,
    duration: DurationForecast,
    size: SizeForecast,
    executable: Arc<dyn Executable>,
}

impl StaticDefinition {
    pub(crate) fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            parameters: Vec::new(),
            duration: DurationForecast::default(),
            size: SizeForecast::default(),
            executable: Arc::new(FnStage(|_: &ExecutionContext| Ok(()))),
        }
    }

    pub(crate) fn with_parameters(mut self, parameters: Vec<ExecutionParameterDescriptor>) -> Self {
        self.parameters = parameters;
        self
    }

    pub(crate) fn with_executable(mut self, executable: Arc<dyn Executable>) -> Self {
        self.executable = executable;
        self
    }
}

impl ProcessDefinition for StaticDefinition {
    fn required_data_types(&self) -> &[DataType] {
        &[DataType::Rawdata]
    }

    fn parameters(&self) -> &[ExecutionParameterDescriptor] {
        &self.parameters
    }

    fn size_forecast(&self) -> SizeForecast {
        self.size
    }

    fn duration_forecast(&self) -> DurationForecast {
        self.duration
    }

    fn engine_name(&self) -> &str {
        &self.engine
    }

    fn executable(&self) -> Arc<dyn Executable> {
        Arc::clone(&self.executable)
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that records every step without any sequencing rule.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    steps: Mutex<Vec<(ExecutionStatus, String)>>,
}

impl RecordingReporter {
    pub(crate) fn steps(&self) -> Vec<(ExecutionStatus, String)> {
        self.steps.lock().clone()
    }

    pub(crate) fn statuses(&self) -> Vec<ExecutionStatus> {
        self.steps.lock().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl StepReporter for RecordingReporter {
    async fn report(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        message: String,
    ) -> anyhow::Result<AppendOutcome> {
        let mut steps = self.steps.lock();
        steps.push((status, message.clone()));
        Ok(AppendOutcome::Appended(ExecutionStep {
            id: steps.len() as u64,
            execution_id,
            status,
            time_ms: 0,
            message,
        }))
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

pub(crate) fn make_process(definition: Arc<dyn ProcessDefinition>) -> Process {
    Process {
        business_id: Uuid::new_v4(),
        name: "proc".to_string(),
        active: true,
        tenant: "project1".to_string(),
        role: "PUBLIC".to_string(),
        datasets: BTreeSet::new(),
        quotas: QuotaLimits::default(),
        definition,
        engine: None,
    }
}

pub(crate) fn make_context_with(
    executable: Arc<dyn Executable>,
    reporter: Arc<RecordingReporter>,
) -> ExecutionContext {
    let batch = make_batch();
    ExecutionContext {
        execution: make_execution(batch.id),
        batch,
        process: make_process(Arc::new(
            StaticDefinition::new("local").with_executable(executable),
        )),
        reporter,
    }
}

pub(crate) fn make_context() -> ExecutionContext {
    make_context_with(
        Arc::new(FnStage(|_: &ExecutionContext| Ok(()))),
        Arc::new(RecordingReporter::default()),
    )
}
