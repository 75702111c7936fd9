//! Processing server: process catalog, workload engine registry and the
//! execution lifecycle.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod rights;
pub mod storage;
pub mod telemetry;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod testing;

pub use catalog::{Process, ProcessCatalog};
pub use config::ProcessingConfig;
pub use error::{CatalogError, LifecycleError, SubmitError};
pub use lifecycle::{ExecutionJournal, ExecutionLifecycleManager, TimeoutWatcher};
pub use traits::{
    BatchRepository, DefinitionSource, ExecutionRepository, QuotaLedger, RightsStore,
    RoleAuthorizer,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
