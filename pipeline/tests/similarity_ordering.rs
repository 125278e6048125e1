use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use eventmesh_core::domain::{Event, DEFAULT_VECTOR_DIM};
use eventmesh_core::storage::Storage;
use eventmesh_pipeline::embedding::{EmbeddingBatchResult, EmbeddingClient};
use eventmesh_pipeline::error::Result;
use eventmesh_pipeline::similarity::SimilarityService;
use eventmesh_pipeline::storage::InMemoryStorage;

struct FixedQueryEmbeddingClient {
    vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for FixedQueryEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatchResult> {
        Ok(EmbeddingBatchResult {
            vectors: texts.iter().map(|_| self.vector.clone()).collect(),
            tokens_used: None,
        })
    }
}

fn unit_vector_along(dim_index: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; DEFAULT_VECTOR_DIM];
    v[dim_index] = 1.0;
    v
}

/// Three events with known vectors at increasing angular distance from
/// the query vector; nearest_neighbors must return them closest-first.
#[tokio::test]
async fn three_events_with_known_vectors_return_in_distance_order() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

    let query_vector = unit_vector_along(0);

    let mut closest = Event::new(
        "Closest".into(),
        Utc::now() + Duration::days(1),
        Utc::now() + Duration::days(1) + Duration::hours(1),
        None,
        "https://x/closest".into(),
        None,
        None,
        None,
        "test".into(),
        Some("place-1".into()),
    );
    storage.upsert_event(&mut closest).await.unwrap();
    storage.set_event_embedding(closest.id.unwrap(), &unit_vector_along(0)).await.unwrap();

    let mut middle = Event::new(
        "Middle".into(),
        Utc::now() + Duration::days(1),
        Utc::now() + Duration::days(1) + Duration::hours(1),
        None,
        "https://x/middle".into(),
        None,
        None,
        None,
        "test".into(),
        Some("place-2".into()),
    );
    storage.upsert_event(&mut middle).await.unwrap();
    let mut blended = vec![0.0_f32; DEFAULT_VECTOR_DIM];
    blended[0] = 0.7;
    blended[1] = 0.7;
    storage.set_event_embedding(middle.id.unwrap(), &blended).await.unwrap();

    let mut farthest = Event::new(
        "Farthest".into(),
        Utc::now() + Duration::days(1),
        Utc::now() + Duration::days(1) + Duration::hours(1),
        None,
        "https://x/farthest".into(),
        None,
        None,
        None,
        "test".into(),
        Some("place-3".into()),
    );
    storage.upsert_event(&mut farthest).await.unwrap();
    storage.set_event_embedding(farthest.id.unwrap(), &unit_vector_along(1)).await.unwrap();

    let client: Arc<dyn EmbeddingClient> = Arc::new(FixedQueryEmbeddingClient { vector: query_vector });
    let service = SimilarityService::new(storage, client);

    let results = service.find_similar("anything", 10).await.unwrap();
    let names: Vec<_> = results.iter().map(|e| e.event_name.as_str()).collect();

    assert_eq!(names, vec!["Closest", "Middle", "Farthest"]);
}
