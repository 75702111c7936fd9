//! Process definitions: the pluggable descriptors of runnable capabilities.
//!
//! A [`PluginConfiguration`] is the stored form of one definition instance.
//! [`DefinitionFactories`] turns it into a live [`ProcessDefinition`] using
//! the factory registered for its plugin id.

pub mod executable;
pub mod factory;
pub mod shell;

use std::sync::Arc;

use processing_core::{
    Batch, ConstraintChecker, DataType, DurationForecast, ExecutionParameterDescriptor,
    SizeForecast,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use executable::{Executable, FnStage, Stages};
pub use factory::{DefinitionFactories, DefinitionFactory};
pub use shell::{ShellProcessDefinition, SHELL_PLUGIN_ID};

// ---------------------------------------------------------------------------
// PluginConfiguration
// ---------------------------------------------------------------------------

/// Stored configuration of one process definition instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfiguration {
    /// Stable identifier rights bindings refer to.
    pub business_id: Uuid,
    /// Identifier of the factory that builds the definition.
    pub plugin_id: String,
    /// Display name; becomes the process name.
    pub label: String,
    pub active: bool,
    /// Factory-specific parameters.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl PluginConfiguration {
    #[must_use]
    pub fn new(business_id: Uuid, plugin_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            business_id,
            plugin_id: plugin_id.into(),
            label: label.into(),
            active: true,
            parameters: serde_json::Map::new(),
        }
    }

    /// Sets one parameter, builder style.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

// ---------------------------------------------------------------------------
// ProcessDefinition trait
// ---------------------------------------------------------------------------

/// A runnable capability, independent of who may run it.
///
/// Definitions are stateless and immutable once built; rights, datasets and
/// quotas come from the rights binding joined with it in the catalog.
pub trait ProcessDefinition: Send + Sync {
    /// Input file roles the process consumes.
    fn required_data_types(&self) -> &[DataType];

    /// Parameters the submitting user may or must supply.
    fn parameters(&self) -> &[ExecutionParameterDescriptor];

    fn size_forecast(&self) -> SizeForecast;

    fn duration_forecast(&self) -> DurationForecast;

    /// Name of the workload engine that runs the process.
    fn engine_name(&self) -> &str;

    fn executable(&self) -> Arc<dyn Executable>;

    /// Extra batch constraints contributed by the definition.
    fn batch_checker(&self) -> ConstraintChecker<Batch> {
        ConstraintChecker::no_violation()
    }
}
