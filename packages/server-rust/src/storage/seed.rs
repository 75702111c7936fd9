//! Startup data for the in-memory stores, read from a JSON document.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use processing_core::Batch;

use super::memory::{InMemoryDefinitionSource, InMemoryRightsStore};
use crate::definition::PluginConfiguration;
use crate::rights::RightsBinding;

/// Plugin configurations and rights bindings loaded at node start, plus
/// batches to submit once the node is running.
///
/// ```json
/// {
///   "configurations": [{ "business_id": "...", "plugin_id": "SimpleShellProcess",
///                        "label": "echo", "active": true,
///                        "parameters": { "shellScript": "/opt/echo.sh" } }],
///   "rights": [{ "process_business_id": "...", "tenant": "project1", "role": "PUBLIC" }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub configurations: Vec<PluginConfiguration>,
    #[serde(default)]
    pub rights: Vec<RightsBinding>,
    #[serde(default)]
    pub batches: Vec<Batch>,
}

impl Seed {
    /// Reads and parses a seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid seed.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read seed file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid seed file {}", path.display()))
    }

    /// Inserts configurations and bindings into the stores, replacing
    /// entries with the same key, and returns the batches.
    #[must_use]
    pub fn apply(
        self,
        definitions: &InMemoryDefinitionSource,
        rights: &InMemoryRightsStore,
    ) -> Vec<Batch> {
        for configuration in self.configurations {
            definitions.put(configuration);
        }
        for binding in self.rights {
            rights.put(binding);
        }
        self.batches
    }
}
