use std::collections::HashMap;
use std::sync::Arc;

use eventmesh_core::domain::EntityKind;
use eventmesh_core::error::CoreError;
use eventmesh_core::storage::Storage;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::observability::metrics;

/// `FindOrCreateByName` for a naturally-keyed entity (Artist or Tag).
/// Holds an in-memory name -> id cache safe for concurrent readers;
/// writers go through `Storage`, which owns the batched lookup/insert
/// and the unique-violation retry-read.
pub struct NameRegistry {
    kind: EntityKind,
    storage: Arc<dyn Storage>,
    cache: RwLock<HashMap<String, Uuid>>,
}

impl NameRegistry {
    pub fn new(kind: EntityKind, storage: Arc<dyn Storage>) -> Self {
        Self {
            kind,
            storage,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Clears the in-process cache on explicit request.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn find_or_create(&self, names: &[String]) -> Result<HashMap<String, Uuid>> {
        let mut wanted: Vec<String> = names
            .iter()
            .map(|raw| self.kind.normalize(raw))
            .filter(|n| !n.is_empty())
            .collect();
        wanted.sort();
        wanted.dedup();

        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let mut resolved = HashMap::new();
        let mut misses = Vec::new();
        {
            let cache = self.cache.read().await;
            for name in &wanted {
                match cache.get(name) {
                    Some(id) => {
                        resolved.insert(name.clone(), *id);
                        metrics::registries::cache_hit(self.kind.table_name());
                    }
                    None => misses.push(name.clone()),
                }
            }
        }

        if !misses.is_empty() {
            metrics::registries::cache_miss(self.kind.table_name(), misses.len());
            let found = self.storage.find_entities_by_name(self.kind, &misses).await?;
            let mut still_missing: Vec<String> = Vec::new();
            for name in &misses {
                match found.get(name) {
                    Some(id) => {
                        resolved.insert(name.clone(), *id);
                    }
                    None => still_missing.push(name.clone()),
                }
            }

            if !still_missing.is_empty() {
                match self.storage.insert_entities(self.kind, &still_missing).await {
                    Ok(inserted) => {
                        resolved.extend(inserted);
                    }
                    Err(CoreError::Race(_)) => {
                        // Another worker inserted concurrently: retry the read
                        // and merge, never surface the race to the caller.
                        metrics::registries::race_retried(self.kind.table_name());
                        let reread = self
                            .storage
                            .find_entities_by_name(self.kind, &still_missing)
                            .await?;
                        resolved.extend(reread);
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        }

        {
            let mut cache = self.cache.write().await;
            for (name, id) in &resolved {
                cache.insert(name.clone(), *id);
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn trims_and_drops_empty_names() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let registry = NameRegistry::new(EntityKind::Artist, storage);
        let resolved = registry
            .find_or_create(&["  The Band  ".to_string(), "".to_string(), "   ".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("The Band"));
    }

    #[tokio::test]
    async fn repeated_calls_return_the_same_id() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let registry = NameRegistry::new(EntityKind::Tag, storage);
        let first = registry.find_or_create(&["Rock Alternatywny".to_string()]).await.unwrap();
        let second = registry.find_or_create(&["rock-alternatywny".to_string()]).await.unwrap();
        let id_a = first.values().next().copied().unwrap();
        let id_b = second.values().next().copied().unwrap();
        assert_eq!(id_a, id_b, "normalized variants must resolve to one tag");
    }
}
