//! Process catalog: resolves which processes a tenant and role may run.
//!
//! A [`Process`] is the join of a rights binding, the plugin configuration
//! it references, the definition built from that configuration, and the
//! engine the definition names. Bulk listings resolve every binding of a
//! tenant concurrently; one candidate failing never hides the others.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use processing_core::constraint::{
    allowed_datasets, allowed_tenants, for_each, project, RequiredParameters,
};
use processing_core::{
    AuthToken, Batch, ConstraintChecker, DurationForecast, ExecutionParameterDescriptor,
    QuotaLimits, QuotaUsage, SizeForecast,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::definition::{DefinitionFactories, ProcessDefinition};
use crate::engine::{WorkloadEngine, WorkloadEngineRegistry};
use crate::error::CatalogError;
use crate::rights::RightsBinding;
use crate::traits::{DefinitionSource, RightsStore, RoleAuthorizer};

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// A process as seen by one tenant.
#[derive(Clone)]
pub struct Process {
    pub business_id: Uuid,
    pub name: String,
    pub active: bool,
    pub tenant: String,
    /// Minimum role required to run the process.
    pub role: String,
    /// Datasets batches may draw from; empty means any.
    pub datasets: BTreeSet<String>,
    pub quotas: QuotaLimits,
    pub definition: Arc<dyn ProcessDefinition>,
    /// Engine registered under the definition's engine name at resolution time.
    pub engine: Option<Arc<dyn WorkloadEngine>>,
}

impl Process {
    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.definition.engine_name()
    }

    #[must_use]
    pub fn parameters(&self) -> &[ExecutionParameterDescriptor] {
        self.definition.parameters()
    }

    #[must_use]
    pub fn size_forecast(&self) -> SizeForecast {
        self.definition.size_forecast()
    }

    #[must_use]
    pub fn duration_forecast(&self) -> DurationForecast {
        self.definition.duration_forecast()
    }

    /// Rights constraints a batch must satisfy: tenant, datasets, mandatory
    /// parameters, then whatever the definition adds.
    #[must_use]
    pub fn batch_checker(&self) -> ConstraintChecker<Batch> {
        ConstraintChecker::no_violation()
            .with(project(
                allowed_tenants(BTreeSet::from([self.tenant.clone()])),
                |b: &Batch| b.tenant.clone(),
            ))
            .with(for_each(
                allowed_datasets(self.datasets.clone()),
                Batch::datasets,
            ))
            .with(RequiredParameters::from_descriptors(self.parameters()))
            .and(self.definition.batch_checker())
    }

    /// Quota constraints over the usage a submission would reach.
    #[must_use]
    pub fn quota_checker(&self) -> ConstraintChecker<QuotaUsage> {
        self.quotas.checker()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("business_id", &self.business_id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("tenant", &self.tenant)
            .field("role", &self.role)
            .field("datasets", &self.datasets)
            .field("engine", &self.engine_name())
            .field("engine_registered", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ProcessCatalog
// ---------------------------------------------------------------------------

/// Resolves processes from rights bindings and plugin configurations.
pub struct ProcessCatalog {
    rights: Arc<dyn RightsStore>,
    definitions: Arc<dyn DefinitionSource>,
    factories: Arc<DefinitionFactories>,
    engines: Arc<WorkloadEngineRegistry>,
    authorizer: Arc<dyn RoleAuthorizer>,
    role_check_timeout: Duration,
}

impl ProcessCatalog {
    #[must_use]
    pub fn new(
        rights: Arc<dyn RightsStore>,
        definitions: Arc<dyn DefinitionSource>,
        factories: Arc<DefinitionFactories>,
        engines: Arc<WorkloadEngineRegistry>,
        authorizer: Arc<dyn RoleAuthorizer>,
        role_check_timeout: Duration,
    ) -> Self {
        Self {
            rights,
            definitions,
            factories,
            engines,
            authorizer,
            role_check_timeout,
        }
    }

    /// Builds the process for one binding.
    ///
    /// `Ok(None)` when the configuration is not a process definition or its
    /// factory rejects it.
    async fn resolve(&self, binding: RightsBinding) -> Result<Option<Process>, CatalogError> {
        let business_id = binding.process_business_id;
        let config = self
            .definitions
            .configuration(business_id)
            .await?
            .ok_or(CatalogError::RightsConfigurationNotFound { business_id })?;

        let definition = match self.factories.instantiate(&config) {
            None => return Ok(None),
            Some(Ok(definition)) => definition,
            Some(Err(err)) => {
                warn!(
                    business_id = %business_id,
                    plugin_id = %config.plugin_id,
                    error = %format!("{err:#}"),
                    "cannot build process definition"
                );
                return Ok(None);
            }
        };

        let engine = self.engines.find_by_name(definition.engine_name());
        Ok(Some(Process {
            business_id,
            name: config.label,
            active: config.active,
            tenant: binding.tenant,
            role: binding.role,
            datasets: binding.datasets,
            quotas: binding.quotas,
            definition,
            engine,
        }))
    }

    /// Every process granted to `tenant` whose engine is registered.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the bindings cannot be read.
    /// Failures resolving individual bindings only exclude them.
    pub async fn list_for_tenant(&self, tenant: &str) -> Result<Vec<Process>, CatalogError> {
        let bindings = self.rights.bindings_for_tenant(tenant).await?;
        let resolved = join_all(bindings.into_iter().map(|b| self.resolve(b))).await;

        Ok(resolved
            .into_iter()
            .filter_map(|result| match result {
                Ok(Some(process)) if process.engine.is_some() => Some(process),
                Ok(Some(process)) => {
                    debug!(
                        tenant = %tenant,
                        process = %process.name,
                        engine = %process.engine_name(),
                        "skipping process with unregistered engine"
                    );
                    None
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(tenant = %tenant, error = %err, "skipping unresolvable rights binding");
                    None
                }
            })
            .collect())
    }

    /// Processes of `tenant` a user with `role` may run.
    ///
    /// Role checks run concurrently, each bounded by the configured timeout;
    /// a failed or timed-out check excludes its candidate.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the bindings cannot be read.
    pub async fn list_for_tenant_and_role(
        &self,
        tenant: &str,
        role: &str,
        token: &AuthToken,
    ) -> Result<Vec<Process>, CatalogError> {
        let candidates = self.list_for_tenant(tenant).await?;
        let checks = join_all(
            candidates
                .iter()
                .map(|process| self.role_allows(role, &process.role, token)),
        )
        .await;

        Ok(candidates
            .into_iter()
            .zip(checks)
            .filter_map(|(process, allowed)| allowed.then_some(process))
            .collect())
    }

    /// First process of `tenant` named `name`.
    ///
    /// # Errors
    ///
    /// Same as [`ProcessCatalog::list_for_tenant`].
    pub async fn find_by_name(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<Option<Process>, CatalogError> {
        Ok(self
            .list_for_tenant(tenant)
            .await?
            .into_iter()
            .find(|p| p.name == name))
    }

    /// The process bound to `tenant` under `business_id`.
    ///
    /// Unlike the listings, the engine does not have to be registered.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::RightsConfigurationNotFound`] if the binding
    /// references a missing configuration.
    pub async fn find_by_business_id(
        &self,
        tenant: &str,
        business_id: Uuid,
    ) -> Result<Option<Process>, CatalogError> {
        match self.rights.binding(tenant, business_id).await? {
            Some(binding) => self.resolve(binding).await,
            None => Ok(None),
        }
    }

    /// The process a batch targets, if the batch's tenant and role may run it.
    ///
    /// # Errors
    ///
    /// Same as [`ProcessCatalog::find_by_business_id`].
    pub async fn find_for_batch(
        &self,
        batch: &Batch,
        token: &AuthToken,
    ) -> Result<Option<Process>, CatalogError> {
        let Some(process) = self
            .find_by_business_id(&batch.tenant, batch.process_business_id)
            .await?
        else {
            return Ok(None);
        };
        if self.role_allows(&batch.user_role, &process.role, token).await {
            Ok(Some(process))
        } else {
            debug!(
                batch_id = %batch.id,
                role = %batch.user_role,
                required = %process.role,
                "role not allowed to run process"
            );
            Ok(None)
        }
    }

    /// Deny-by-default role check.
    async fn role_allows(&self, candidate: &str, required: &str, token: &AuthToken) -> bool {
        match tokio::time::timeout(
            self.role_check_timeout,
            self.authorizer.is_role_under(candidate, required, token),
        )
        .await
        {
            Ok(Ok(allowed)) => allowed,
            Ok(Err(err)) => {
                warn!(role = %candidate, required = %required, error = %err, "role check failed");
                false
            }
            Err(_) => {
                warn!(
                    role = %candidate,
                    required = %required,
                    timeout_ms = self.role_check_timeout.as_millis(),
                    "role check timed out"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use processing_core::{BatchId, ExecutionParameterType, ExecutionParameterValue};

    use super::*;
    use crate::auth::StaticRoleHierarchy;
    use crate::definition::{PluginConfiguration, SHELL_PLUGIN_ID};
    use crate::engine::ExecutionContext;
    use crate::storage::{InMemoryDefinitionSource, InMemoryRightsStore};
    use crate::testing::{make_batch, StaticDefinition};

    struct NoopEngine(&'static str);

    #[async_trait]
    impl WorkloadEngine for NoopEngine {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _context: ExecutionContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Denies nothing but never answers for `slow_role`.
    struct SlowFor(&'static str);

    #[async_trait]
    impl RoleAuthorizer for SlowFor {
        async fn is_role_under(
            &self,
            _candidate: &str,
            required: &str,
            _token: &AuthToken,
        ) -> anyhow::Result<bool> {
            if required == self.0 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(true)
        }
    }

    struct Fixture {
        rights: Arc<InMemoryRightsStore>,
        definitions: Arc<InMemoryDefinitionSource>,
        engines: Arc<WorkloadEngineRegistry>,
        catalog: ProcessCatalog,
    }

    fn fixture_with(authorizer: Arc<dyn RoleAuthorizer>) -> Fixture {
        let rights = Arc::new(InMemoryRightsStore::new());
        let definitions = Arc::new(InMemoryDefinitionSource::new());
        let factories = Arc::new(DefinitionFactories::with_builtin());
        factories.register_factory("Static", |config| {
            let engine = config
                .parameters
                .get("engine")
                .and_then(|v| v.as_str())
                .unwrap_or("jobs")
                .to_string();
            Ok(Arc::new(StaticDefinition::new(engine)) as Arc<dyn ProcessDefinition>)
        });
        let engines = Arc::new(WorkloadEngineRegistry::new());
        engines.register(Arc::new(NoopEngine("jobs")));
        let catalog = ProcessCatalog::new(
            rights.clone(),
            definitions.clone(),
            factories,
            engines.clone(),
            authorizer,
            Duration::from_millis(100),
        );
        Fixture {
            rights,
            definitions,
            engines,
            catalog,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(StaticRoleHierarchy::default()))
    }

    impl Fixture {
        fn add(&self, name: &str, role: &str, engine: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.definitions.put(
                PluginConfiguration::new(id, "Static", name)
                    .with_parameter("engine", serde_json::json!(engine)),
            );
            self.rights.put(RightsBinding::new(id, "t1", role));
            id
        }
    }

    #[tokio::test]
    async fn list_for_tenant_skips_unregistered_engines() {
        let f = fixture();
        f.add("a", "PUBLIC", "jobs");
        f.add("b", "PUBLIC", "missing");

        let names: Vec<_> = f
            .catalog
            .list_for_tenant("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a".to_string()]);
        assert!(f.catalog.list_for_tenant("t2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_missing_configuration_and_ineligible_plugins() {
        let f = fixture();
        f.add("good", "PUBLIC", "jobs");
        f.rights.put(RightsBinding::new(Uuid::new_v4(), "t1", "PUBLIC"));
        let storage_id = Uuid::new_v4();
        f.definitions
            .put(PluginConfiguration::new(storage_id, "StoragePlugin", "s3"));
        f.rights.put(RightsBinding::new(storage_id, "t1", "PUBLIC"));
        let broken_id = Uuid::new_v4();
        f.definitions
            .put(PluginConfiguration::new(broken_id, SHELL_PLUGIN_ID, "no-script"));
        f.rights.put(RightsBinding::new(broken_id, "t1", "PUBLIC"));

        let processes = f.catalog.list_for_tenant("t1").await.unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].name, "good");
    }

    #[tokio::test]
    async fn find_by_business_id_reports_missing_configuration() {
        let f = fixture();
        let id = Uuid::new_v4();
        f.rights.put(RightsBinding::new(id, "t1", "PUBLIC"));

        let err = f.catalog.find_by_business_id("t1", id).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::RightsConfigurationNotFound { business_id } if business_id == id
        ));
        assert!(f
            .catalog
            .find_by_business_id("t1", Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_by_business_id_does_not_require_engine() {
        let f = fixture();
        let id = f.add("later", "PUBLIC", "missing");

        let process = f.catalog.find_by_business_id("t1", id).await.unwrap().unwrap();
        assert!(process.engine.is_none());
        assert_eq!(process.engine_name(), "missing");
    }

    #[tokio::test]
    async fn find_by_name_returns_listed_process() {
        let f = fixture();
        let id = f.add("thumbnails", "PUBLIC", "jobs");

        let found = f.catalog.find_by_name("t1", "thumbnails").await.unwrap();
        assert_eq!(found.map(|p| p.business_id), Some(id));
        assert!(f.catalog.find_by_name("t1", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_listing_filters_by_hierarchy() {
        let f = fixture();
        f.add("public", "PUBLIC", "jobs");
        f.add("admin", "ADMIN", "jobs");

        let token = AuthToken::new("t");
        let for_user = f
            .catalog
            .list_for_tenant_and_role("t1", "REGISTERED_USER", &token)
            .await
            .unwrap();
        assert_eq!(for_user.len(), 1);
        assert_eq!(for_user[0].name, "public");

        let for_admin = f
            .catalog
            .list_for_tenant_and_role("t1", "ADMIN", &token)
            .await
            .unwrap();
        assert_eq!(for_admin.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_role_check_excludes_only_that_candidate() {
        let f = fixture_with(Arc::new(SlowFor("SLOW")));
        f.add("a", "PUBLIC", "jobs");
        f.add("b", "EXPLOIT", "jobs");
        f.add("c", "SLOW", "jobs");

        let mut names: Vec<_> = f
            .catalog
            .list_for_tenant_and_role("t1", "ADMIN", &AuthToken::new("t"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn find_for_batch_checks_role() {
        let f = fixture();
        let id = f.add("admin-only", "ADMIN", "jobs");
        let mut batch = make_batch();
        batch.tenant = "t1".to_string();
        batch.process_business_id = id;
        let token = AuthToken::new("t");

        batch.user_role = "REGISTERED_USER".to_string();
        assert!(f.catalog.find_for_batch(&batch, &token).await.unwrap().is_none());

        batch.user_role = "PROJECT_ADMIN".to_string();
        assert!(f.catalog.find_for_batch(&batch, &token).await.unwrap().is_some());
    }

    #[test]
    fn batch_checker_combines_rights_constraints() {
        let f = fixture();
        let mut process = Process {
            business_id: Uuid::new_v4(),
            name: "p".to_string(),
            active: true,
            tenant: "t1".to_string(),
            role: "PUBLIC".to_string(),
            datasets: BTreeSet::from(["D1".to_string()]),
            quotas: QuotaLimits::default(),
            definition: Arc::new(StaticDefinition::new("jobs").with_parameters(vec![
                ExecutionParameterDescriptor {
                    name: "level".to_string(),
                    param_type: ExecutionParameterType::Integer,
                    description: String::new(),
                    optional: false,
                },
            ])),
            engine: f.engines.find_by_name("jobs"),
        };

        let mut batch = make_batch();
        batch.id = BatchId::random();
        batch.tenant = "t2".to_string();
        batch.parameters.clear();
        let violations = process.batch_checker().check(&batch);
        // Tenant, dataset D2 from the fixture batch, and the missing parameter.
        assert_eq!(violations.len(), 3);

        process.datasets.clear();
        batch.tenant = "t1".to_string();
        batch.parameters.push(ExecutionParameterValue {
            name: "level".to_string(),
            value: "1".to_string(),
        });
        assert!(process.batch_checker().check(&batch).is_empty());
    }
}
