//! In-memory implementations of the boundary stores.
//!
//! - [`memory`]: rights bindings, plugin configurations, batches, executions
//! - [`quota`]: the quota ledger
//! - [`seed`]: startup data for the in-memory stores

pub mod memory;
pub mod quota;
pub mod seed;

pub use memory::{
    InMemoryBatchRepository, InMemoryDefinitionSource, InMemoryExecutionRepository,
    InMemoryRightsStore,
};
pub use quota::InMemoryQuotaLedger;
pub use seed::Seed;
