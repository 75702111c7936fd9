use std::sync::Arc;

use dashmap::DashMap;

use super::{PluginConfiguration, ProcessDefinition};

/// Builds a definition from its stored configuration.
pub type DefinitionFactory =
    dyn Fn(&PluginConfiguration) -> anyhow::Result<Arc<dyn ProcessDefinition>> + Send + Sync;

/// Registration-time map from plugin id to definition factory.
///
/// A configuration whose plugin id has no factory is not a process
/// definition at all and is ignored by the catalog.
pub struct DefinitionFactories {
    factories: DashMap<String, Arc<DefinitionFactory>>,
}

impl DefinitionFactories {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Creates a registry holding the built-in shell definition factory.
    #[must_use]
    pub fn with_builtin() -> Self {
        let factories = Self::new();
        factories.register_factory(super::SHELL_PLUGIN_ID, |config| {
            Ok(Arc::new(super::ShellProcessDefinition::from_configuration(config)?)
                as Arc<dyn ProcessDefinition>)
        });
        factories
    }

    /// Registers `factory` under `plugin_id`, replacing any previous one.
    pub fn register_factory<F>(&self, plugin_id: impl Into<String>, factory: F)
    where
        F: Fn(&PluginConfiguration) -> anyhow::Result<Arc<dyn ProcessDefinition>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(plugin_id.into(), Arc::new(factory));
    }

    /// Whether configurations with this plugin id describe process definitions.
    #[must_use]
    pub fn is_eligible(&self, plugin_id: &str) -> bool {
        self.factories.contains_key(plugin_id)
    }

    /// Builds the definition for `config`.
    ///
    /// Returns `None` when the plugin id is not eligible.
    ///
    /// # Errors
    ///
    /// Returns the factory's error when the configuration is invalid.
    pub fn instantiate(
        &self,
        config: &PluginConfiguration,
    ) -> Option<anyhow::Result<Arc<dyn ProcessDefinition>>> {
        // Clone out of the shard so the factory runs without holding its lock.
        let factory = self
            .factories
            .get(&config.plugin_id)
            .map(|entry| Arc::clone(entry.value()))?;
        Some(factory(config))
    }
}

impl Default for DefinitionFactories {
    fn default() -> Self {
        Self::new()
    }
}
