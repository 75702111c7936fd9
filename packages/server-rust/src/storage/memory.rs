//! In-memory stores backed by [`DashMap`].
//!
//! Suitable for tests and single-node runs where nothing needs to survive a
//! restart. Per-execution step appends are serialized by the entry's shard
//! lock.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use processing_core::{
    AppendOutcome, Batch, BatchId, Execution, ExecutionId, ExecutionStatus, ExecutionStep,
    StepSequence, TransitionOutcome,
};
use uuid::Uuid;

use crate::definition::PluginConfiguration;
use crate::rights::RightsBinding;
use crate::traits::{BatchRepository, DefinitionSource, ExecutionRepository, RightsStore};

// ---------------------------------------------------------------------------
// Rights and definitions
// ---------------------------------------------------------------------------

/// Rights bindings keyed by tenant and process business id.
#[derive(Default)]
pub struct InMemoryRightsStore {
    bindings: DashMap<(String, Uuid), RightsBinding>,
}

impl InMemoryRightsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a binding.
    pub fn put(&self, binding: RightsBinding) {
        self.bindings.insert(
            (binding.tenant.clone(), binding.process_business_id),
            binding,
        );
    }

    pub fn remove(&self, tenant: &str, process_business_id: Uuid) -> Option<RightsBinding> {
        self.bindings
            .remove(&(tenant.to_string(), process_business_id))
            .map(|(_, b)| b)
    }
}

#[async_trait]
impl RightsStore for InMemoryRightsStore {
    async fn bindings_for_tenant(&self, tenant: &str) -> anyhow::Result<Vec<RightsBinding>> {
        Ok(self
            .bindings
            .iter()
            .filter(|entry| entry.key().0 == tenant)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn binding(
        &self,
        tenant: &str,
        process_business_id: Uuid,
    ) -> anyhow::Result<Option<RightsBinding>> {
        Ok(self
            .bindings
            .get(&(tenant.to_string(), process_business_id))
            .map(|entry| entry.value().clone()))
    }
}

/// Plugin configurations keyed by business id.
#[derive(Default)]
pub struct InMemoryDefinitionSource {
    configurations: DashMap<Uuid, PluginConfiguration>,
}

impl InMemoryDefinitionSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a configuration.
    pub fn put(&self, configuration: PluginConfiguration) {
        self.configurations
            .insert(configuration.business_id, configuration);
    }

    pub fn remove(&self, business_id: Uuid) -> Option<PluginConfiguration> {
        self.configurations.remove(&business_id).map(|(_, c)| c)
    }
}

#[async_trait]
impl DefinitionSource for InMemoryDefinitionSource {
    async fn configuration(
        &self,
        business_id: Uuid,
    ) -> anyhow::Result<Option<PluginConfiguration>> {
        Ok(self
            .configurations
            .get(&business_id)
            .map(|entry| entry.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBatchRepository {
    batches: DashMap<BatchId, Batch>,
}

impl InMemoryBatchRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn save(&self, batch: Batch) -> anyhow::Result<Batch> {
        let batch = batch.into_persisted();
        self.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn find(&self, id: BatchId) -> anyhow::Result<Option<Batch>> {
        Ok(self.batches.get(&id).map(|entry| entry.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

struct ExecutionRecord {
    execution: Execution,
    steps: StepSequence,
}

/// Executions and their step sequences.
pub struct InMemoryExecutionRepository {
    records: DashMap<ExecutionId, ExecutionRecord>,
    next_step_id: AtomicU64,
}

impl InMemoryExecutionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_step_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn next_step_id(&self) -> u64 {
        self.next_step_id.fetch_add(1, Ordering::Relaxed)
    }

    fn collect_where(&self, predicate: impl Fn(&ExecutionRecord) -> bool) -> Vec<Execution> {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().execution.clone())
            .collect()
    }
}

impl Default for InMemoryExecutionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: Execution, now_ms: u64) -> anyhow::Result<Execution> {
        match self.records.entry(execution.id) {
            Entry::Occupied(_) => anyhow::bail!("execution {} already exists", execution.id),
            Entry::Vacant(vacant) => {
                let execution = execution.into_persisted();
                let mut steps = StepSequence::new();
                steps.append(
                    self.next_step_id(),
                    execution.id,
                    ExecutionStatus::Pending,
                    now_ms,
                    "",
                );
                vacant.insert(ExecutionRecord {
                    execution: execution.clone(),
                    steps,
                });
                Ok(execution)
            }
        }
    }

    async fn find(&self, id: ExecutionId) -> anyhow::Result<Option<Execution>> {
        Ok(self.records.get(&id).map(|r| r.execution.clone()))
    }

    async fn steps(&self, id: ExecutionId) -> anyhow::Result<Option<Vec<ExecutionStep>>> {
        Ok(self.records.get(&id).map(|r| r.steps.steps().to_vec()))
    }

    async fn append_step(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        message: String,
        now_ms: u64,
    ) -> anyhow::Result<Option<AppendOutcome>> {
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        let step_id = self.next_step_id();
        Ok(Some(record.steps.append(step_id, id, status, now_ms, message)))
    }

    async fn transition_step(
        &self,
        id: ExecutionId,
        expected: ExecutionStatus,
        status: ExecutionStatus,
        message: String,
        now_ms: u64,
    ) -> anyhow::Result<Option<TransitionOutcome>> {
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        let step_id = self.next_step_id();
        Ok(Some(
            record
                .steps
                .transition(step_id, id, expected, status, now_ms, message),
        ))
    }

    async fn find_pending_for_batch(
        &self,
        batch_id: BatchId,
    ) -> anyhow::Result<Option<Execution>> {
        Ok(self
            .records
            .iter()
            .find(|entry| {
                entry.execution.batch_id == batch_id
                    && entry.steps.current_status() == Some(ExecutionStatus::Pending)
            })
            .map(|entry| entry.execution.clone()))
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> anyhow::Result<Vec<Execution>> {
        Ok(self.collect_where(|r| r.steps.current_status() == Some(status)))
    }

    async fn list_unfinished(&self) -> anyhow::Result<Vec<Execution>> {
        Ok(self.collect_where(|r| !r.steps.is_terminal()))
    }

    async fn current_status(&self, id: ExecutionId) -> anyhow::Result<Option<ExecutionStatus>> {
        Ok(self
            .records
            .get(&id)
            .and_then(|r| r.steps.current_status()))
    }
}
