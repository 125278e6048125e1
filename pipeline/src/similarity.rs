use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use eventmesh_core::domain::Event;
use eventmesh_core::storage::Storage;

use crate::embedding::EmbeddingClient;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;

/// Answers "find me events like this": embed the query, run a native
/// nearest-neighbour search, hydrate, re-order to match vector
/// distance, then drop anything not fit to show a user.
pub struct SimilarityService {
    storage: Arc<dyn Storage>,
    embedding_client: Arc<dyn EmbeddingClient>,
}

impl SimilarityService {
    pub fn new(storage: Arc<dyn Storage>, embedding_client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            storage,
            embedding_client,
        }
    }

    pub async fn find_similar(&self, query: &str, limit: usize) -> Result<Vec<Event>> {
        if query.trim().is_empty() {
            metrics::similarity::query_rejected_empty();
            return Err(PipelineError::InvalidInput("query text must not be empty".into()));
        }

        let embed_result = self.embedding_client.embed_batch(&[query.to_string()]).await;
        let query_vector = match embed_result {
            Ok(result) => result.vectors.into_iter().next().ok_or_else(|| {
                PipelineError::Permanent("embedding provider returned no vector for the query".into())
            })?,
            Err(e) if e.is_transient() => {
                metrics::similarity::query_degraded();
                return Err(PipelineError::Degraded(format!("embedding provider unavailable: {e}")));
            }
            Err(e) => return Err(e),
        };

        let neighbors = self.storage.nearest_neighbors(&query_vector, limit).await?;
        if neighbors.is_empty() {
            metrics::similarity::query_served(0);
            return Ok(Vec::new());
        }

        let order: HashMap<_, _> = neighbors.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
        let ids: Vec<_> = neighbors.iter().map(|(id, _)| *id).collect();
        let mut hydrated = self.storage.get_events_by_ids(&ids).await?;

        // `get_events_by_ids` does not preserve input order; re-sort to
        // match the nearest-neighbour distance order.
        hydrated.sort_by_key(|e| e.id.and_then(|id| order.get(&id).copied()).unwrap_or(usize::MAX));

        let now = Utc::now();
        let visible: Vec<Event> = hydrated
            .into_iter()
            .filter(|e| e.start_date >= now && e.place_id.is_some())
            .collect();

        metrics::similarity::query_served(visible.len());
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingBatchResult;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use chrono::Duration;
    use eventmesh_core::domain::DEFAULT_VECTOR_DIM;

    struct FakeEmbeddingClient {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingClient for FakeEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatchResult> {
            Ok(EmbeddingBatchResult {
                vectors: texts.iter().map(|_| self.vector.clone()).collect(),
                tokens_used: None,
            })
        }
    }

    fn event_with(url: &str, start_offset_days: i64, place_id: Option<String>) -> Event {
        Event::new(
            "Show".into(),
            Utc::now() + Duration::days(start_offset_days),
            Utc::now() + Duration::days(start_offset_days) + Duration::hours(1),
            None,
            url.into(),
            None,
            None,
            None,
            "test".into(),
            place_id,
        )
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let client: Arc<dyn EmbeddingClient> = Arc::new(FakeEmbeddingClient {
            vector: vec![0.0; DEFAULT_VECTOR_DIM],
        });
        let service = SimilarityService::new(storage, client);
        let err = service.find_similar("   ", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn filters_out_events_without_a_resolved_venue_and_past_events() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

        let mut future_with_venue = event_with("https://x/1", 1, Some("place-1".into()));
        storage.upsert_event(&mut future_with_venue).await.unwrap();
        future_with_venue.set_embedding(vec![1.0; DEFAULT_VECTOR_DIM], DEFAULT_VECTOR_DIM).unwrap();
        storage
            .set_event_embedding(future_with_venue.id.unwrap(), future_with_venue.embedding().unwrap())
            .await
            .unwrap();

        let mut future_without_venue = event_with("https://x/2", 1, None);
        storage.upsert_event(&mut future_without_venue).await.unwrap();
        storage
            .set_event_embedding(future_without_venue.id.unwrap(), &vec![1.0; DEFAULT_VECTOR_DIM])
            .await
            .unwrap();

        let mut past_with_venue = event_with("https://x/3", -1, Some("place-2".into()));
        storage.upsert_event(&mut past_with_venue).await.unwrap();
        storage
            .set_event_embedding(past_with_venue.id.unwrap(), &vec![1.0; DEFAULT_VECTOR_DIM])
            .await
            .unwrap();

        let client: Arc<dyn EmbeddingClient> = Arc::new(FakeEmbeddingClient {
            vector: vec![1.0; DEFAULT_VECTOR_DIM],
        });
        let service = SimilarityService::new(storage, client);
        let results = service.find_similar("jazz tonight", 10).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://x/1");
    }

    #[tokio::test]
    async fn no_matching_vectors_returns_empty_not_an_error() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let client: Arc<dyn EmbeddingClient> = Arc::new(FakeEmbeddingClient {
            vector: vec![0.2; DEFAULT_VECTOR_DIM],
        });
        let service = SimilarityService::new(storage, client);
        let results = service.find_similar("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
