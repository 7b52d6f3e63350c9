use super::LoadFlow;
use crate::{GatError, GatResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Explicit registry of available load-flow implementations.
///
/// Populated by the process at startup and queried by name; the first
/// registered implementation is the default.
#[derive(Clone, Default)]
pub struct LoadFlowRegistry {
    entries: BTreeMap<String, Arc<dyn LoadFlow>>,
    default: Option<String>,
}

impl std::fmt::Debug for LoadFlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadFlowRegistry")
            .field("available", &self.available())
            .field("default", &self.default)
            .finish()
    }
}

impl LoadFlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, load_flow: Arc<dyn LoadFlow>) -> &mut Self {
        let name = load_flow.name().to_ascii_lowercase();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.entries.insert(name, load_flow);
        self
    }

    /// Resolve by name (case-insensitive), or the default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> GatResult<Arc<dyn LoadFlow>> {
        let key = match name {
            Some(n) => n.to_ascii_lowercase(),
            None => self
                .default
                .clone()
                .ok_or_else(|| GatError::Config("no load flow registered".into()))?,
        };
        self.entries.get(&key).cloned().ok_or_else(|| {
            GatError::Config(format!(
                "unknown load flow '{}'; supported values: {}",
                key,
                self.available().join(", ")
            ))
        })
    }

    pub fn available(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
