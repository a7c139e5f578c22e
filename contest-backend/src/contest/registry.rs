//! Module lookup tables, built once at startup

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ContestError, ContestResult};
use crate::models::ModuleConfig;

/// Immutable index of configured modules by id and by source channel
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: Vec<Arc<ModuleConfig>>,
    by_id: HashMap<String, Arc<ModuleConfig>>,
    by_source_channel: HashMap<String, Arc<ModuleConfig>>,
}

impl ModuleRegistry {
    /// Build the index; duplicate ids or source channels are rejected
    pub fn new(modules: Vec<ModuleConfig>) -> ContestResult<Self> {
        let mut registry = Self::default();
        for module in modules {
            registry.insert(module)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, module: ModuleConfig) -> ContestResult<()> {
        if self.by_id.contains_key(&module.id) {
            return Err(ContestError::Configuration(format!(
                "duplicate module id '{}'",
                module.id
            )));
        }
        if let Some(existing) = self.by_source_channel.get(&module.source_channel_id) {
            return Err(ContestError::Configuration(format!(
                "modules '{}' and '{}' share source channel {}",
                existing.id, module.id, module.source_channel_id
            )));
        }

        let module = Arc::new(module);
        self.by_id.insert(module.id.clone(), module.clone());
        self.by_source_channel
            .insert(module.source_channel_id.clone(), module.clone());
        self.modules.push(module);
        Ok(())
    }

    #[cfg(test)]
    pub fn get(&self, module_id: &str) -> Option<Arc<ModuleConfig>> {
        self.by_id.get(module_id).cloned()
    }

    /// The module collecting submissions in a channel
    pub fn for_source_channel(&self, channel_id: &str) -> Option<Arc<ModuleConfig>> {
        self.by_source_channel.get(channel_id).cloned()
    }

    /// Modules in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleConfig>> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
