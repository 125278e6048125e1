use std::collections::HashMap;
use std::sync::Arc;

use super::SourceAdapter;
use crate::error::{PipelineError, Result};

/// Maps a source id to its registered adapter, mirroring the teacher's
/// `SourceRegistry` role of resolving a source id to its configuration —
/// here the configuration is already baked into the adapter at
/// construction time, so the registry only holds identity.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown source: {name}")))
    }

    pub fn all(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
