//! Single-node processing service.
//!
//! Wires the in-memory stores, the local workload engine and the timeout
//! watcher, then runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use processing_core::{AuthToken, ExecutionRequest, SystemClock};
use processing_server::auth::{HttpRoleAuthorizer, StaticRoleHierarchy};
use processing_server::definition::DefinitionFactories;
use processing_server::engine::{LocalEngine, WorkloadEngine, WorkloadEngineRegistry};
use processing_server::lifecycle::TracingStepObserver;
use processing_server::storage::{
    InMemoryBatchRepository, InMemoryDefinitionSource, InMemoryExecutionRepository,
    InMemoryQuotaLedger, InMemoryRightsStore, Seed,
};
use processing_server::telemetry::init_tracing;
use processing_server::{
    ExecutionJournal, ExecutionLifecycleManager, ProcessCatalog, ProcessingConfig,
    RoleAuthorizer, TimeoutWatcher,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "processing-node", version)]
#[command(about = "Runs processes submitted as batches on registered workload engines")]
struct Cli {
    #[command(flatten)]
    processing: ProcessingConfig,

    /// Base URL of the role service. Without it a static role hierarchy is used.
    #[arg(long, env = "PROCESSING_ROLE_SERVICE_URL")]
    role_service_url: Option<String>,

    /// JSON file with plugin configurations and rights bindings to load at
    /// start, and batches to submit once ready.
    #[arg(long, env = "PROCESSING_SEED_FILE")]
    seed: Option<PathBuf>,

    /// Bearer token passed to the role service for seeded batches.
    #[arg(long, env = "PROCESSING_TOKEN", default_value = "", hide_env_values = true)]
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.processing.log_format)?;
    let config = cli.processing;

    let rights = Arc::new(InMemoryRightsStore::new());
    let definitions = Arc::new(InMemoryDefinitionSource::new());
    let mut batches = Vec::new();
    if let Some(path) = &cli.seed {
        batches = Seed::load(path)
            .await
            .context("loading seed data")?
            .apply(&definitions, &rights);
        info!(path = %path.display(), batches = batches.len(), "seed data loaded");
    }

    let authorizer: Arc<dyn RoleAuthorizer> = match &cli.role_service_url {
        Some(url) => {
            info!(url = %url, "using remote role service");
            Arc::new(HttpRoleAuthorizer::new(url.as_str()))
        }
        None => Arc::new(StaticRoleHierarchy::default()),
    };

    let engines = Arc::new(WorkloadEngineRegistry::new());
    let local = LocalEngine::start(config.local_engine_capacity);
    Arc::clone(&local).self_register_in_repo(&engines);

    let catalog = Arc::new(ProcessCatalog::new(
        rights,
        definitions,
        Arc::new(DefinitionFactories::with_builtin()),
        engines.clone(),
        authorizer,
        config.role_check_timeout(),
    ));
    let journal = Arc::new(ExecutionJournal::new(
        Arc::new(InMemoryExecutionRepository::new()),
        Arc::new(InMemoryQuotaLedger::new()),
        Arc::new(TracingStepObserver),
        Arc::new(SystemClock),
    ));
    let watcher = TimeoutWatcher::start(journal.clone(), config.timeout_watch_interval());
    let manager = ExecutionLifecycleManager::new(
        catalog,
        engines.clone(),
        Arc::new(InMemoryBatchRepository::new()),
        journal,
        &config,
    );

    info!(engines = ?engines.names(), "processing node ready");

    let token = AuthToken::new(cli.token);
    for batch in batches {
        let batch_id = batch.id;
        match manager
            .submit(batch, ExecutionRequest::default(), &token)
            .await
        {
            Ok(execution) => info!(%batch_id, execution_id = %execution.id, "batch submitted"),
            Err(err) => warn!(%batch_id, error = %err, "batch rejected"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("shutting down");
    watcher.stop().await;
    local.shutdown().await;
    Ok(())
}
