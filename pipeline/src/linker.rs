use std::sync::Arc;

use eventmesh_core::domain::RelationKind;
use eventmesh_core::storage::Storage;
use uuid::Uuid;

use crate::error::Result;
use crate::observability::metrics;

/// Relationship Linker: reads existing `(event, entity)` pairs, computes
/// the set difference, and batch-inserts only the remainder — idempotent
/// by construction, since calling twice with the same arguments diffs to
/// nothing the second time.
pub struct Linker {
    storage: Arc<dyn Storage>,
}

impl Linker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn link(&self, event_id: Uuid, kind: RelationKind, entity_ids: &[Uuid]) -> Result<usize> {
        let existing = self.storage.existing_relations(event_id, kind).await?;
        let fresh: Vec<Uuid> = entity_ids.iter().copied().filter(|id| !existing.contains(id)).collect();

        if fresh.is_empty() {
            metrics::linker::pairs_skipped_existing(kind.table_name(), entity_ids.len());
            return Ok(0);
        }

        let inserted = self.storage.insert_relations(event_id, kind, &fresh).await?;
        metrics::linker::pairs_inserted(kind.table_name(), inserted);
        if inserted < fresh.len() {
            // Some of `fresh` lost a race to another writer between the
            // read above and this insert; the storage layer's
            // INSERT OR IGNORE already swallowed it.
            metrics::linker::race_swallowed(kind.table_name(), fresh.len() - inserted);
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn second_call_with_same_arguments_is_a_no_op() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let linker = Linker::new(storage);
        let event_id = Uuid::new_v4();
        let artist_id = Uuid::new_v4();

        let first = linker.link(event_id, RelationKind::EventArtist, &[artist_id]).await.unwrap();
        let second = linker.link(event_id, RelationKind::EventArtist, &[artist_id]).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn only_new_pairs_are_inserted() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let linker = Linker::new(storage);
        let event_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        linker.link(event_id, RelationKind::EventTag, &[a]).await.unwrap();
        let second = linker.link(event_id, RelationKind::EventTag, &[a, b]).await.unwrap();

        assert_eq!(second, 1);
    }
}
