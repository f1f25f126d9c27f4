//! Name → constructor map used to select an object engine at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::IndexDbEngine;
use crate::error::{EngineError, EngineResult};
use crate::traits::ObjectEngine;

/// Registered name of [`IndexDbEngine`].
pub const INDEX_DB_ENGINE: &str = "index.db";

/// Builds an engine from configuration.
pub type EngineConstructor = fn(&EngineConfig) -> EngineResult<Arc<dyn ObjectEngine>>;

/// Explicit registry of engine constructors.
///
/// Populated by the process at startup; there is no global registration.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in engine.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(INDEX_DB_ENGINE, open_index_db_engine);
        registry
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, constructor: EngineConstructor) {
        let name = name.into();
        debug!(engine = %name, "registered object engine");
        self.constructors.insert(name, constructor);
    }

    pub fn get(&self, name: &str) -> Option<EngineConstructor> {
        self.constructors.get(name).copied()
    }

    /// Construct the engine named by `config.engine`.
    pub fn build(&self, config: &EngineConfig) -> EngineResult<Arc<dyn ObjectEngine>> {
        let constructor = self
            .get(&config.engine)
            .ok_or_else(|| EngineError::UnknownEngine(config.engine.clone()))?;
        constructor(config)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn open_index_db_engine(config: &EngineConfig) -> EngineResult<Arc<dyn ObjectEngine>> {
    Ok(Arc::new(IndexDbEngine::open(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_engine(config: &EngineConfig) -> EngineResult<Arc<dyn ObjectEngine>> {
        Ok(Arc::new(IndexDbEngine::with_index_dbs(config, HashMap::new())))
    }

    #[test]
    fn defaults_include_index_db() {
        let registry = EngineRegistry::with_defaults();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["index.db"]);
        assert!(registry.get(INDEX_DB_ENGINE).is_some());
    }

    #[test]
    fn build_default_engine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sda")).unwrap();
        let config = EngineConfig {
            devices: dir.path().to_path_buf(),
            ..Default::default()
        };
        let engine = EngineRegistry::with_defaults().build(&config).unwrap();
        assert_eq!(engine.reclaim().unwrap(), 0);
    }

    #[test]
    fn unknown_engine_is_error() {
        let config = EngineConfig {
            engine: "swift".into(),
            ..Default::default()
        };
        let err = EngineRegistry::with_defaults().build(&config).err().unwrap();
        assert!(matches!(err, EngineError::UnknownEngine(name) if name == "swift"));
    }

    #[test]
    fn custom_registration() {
        let mut registry = EngineRegistry::new();
        assert!(registry.get("empty").is_none());
        registry.register("empty", empty_engine);
        let config = EngineConfig {
            engine: "empty".into(),
            ..Default::default()
        };
        assert!(registry.build(&config).is_ok());
    }
}
