use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::WorkloadEngine;

type EngineMap = HashMap<String, Arc<dyn WorkloadEngine>>;

/// Name-indexed registry of workload engines.
///
/// Lookups load an immutable snapshot and never block. Writers serialize on
/// a mutex, copy the snapshot, and publish the new one. Registering a name
/// that is already taken replaces the previous engine.
pub struct WorkloadEngineRegistry {
    engines: ArcSwap<EngineMap>,
    write_lock: Mutex<()>,
}

impl WorkloadEngineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engines: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the engine registered under `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn WorkloadEngine>> {
        self.engines.load().get(name).cloned()
    }

    /// Registers `engine` under its own name and returns the engine it
    /// replaced, if any.
    ///
    /// Re-registering the instance already present changes nothing.
    pub fn register(&self, engine: Arc<dyn WorkloadEngine>) -> Option<Arc<dyn WorkloadEngine>> {
        let _guard = self.write_lock.lock();
        let current = self.engines.load_full();
        let name = engine.name().to_string();

        if let Some(existing) = current.get(&name) {
            if Arc::ptr_eq(existing, &engine) {
                return None;
            }
            warn!(engine = %name, "replacing registered workload engine");
        } else {
            info!(engine = %name, "workload engine registered");
        }

        let mut next = EngineMap::clone(&current);
        let previous = next.insert(name, engine);
        self.engines.store(Arc::new(next));
        previous
    }

    /// Removes the engine registered under `name`.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn WorkloadEngine>> {
        let _guard = self.write_lock.lock();
        let current = self.engines.load_full();
        if !current.contains_key(name) {
            return None;
        }
        let mut next = EngineMap::clone(&current);
        let removed = next.remove(name);
        self.engines.store(Arc::new(next));
        info!(engine = %name, "workload engine deregistered");
        removed
    }

    /// Registered engine names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for WorkloadEngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkloadEngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadEngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
