use std::sync::Arc;
use std::time::Duration;

use eventmesh_core::domain::{NormalizedEventDocument, RelationKind};
use eventmesh_core::storage::Storage;
use eventmesh_pipeline::integrator::Integrator;
use eventmesh_pipeline::storage::InMemoryStorage;

fn doc(url: &str, artists: &str, tags: &str) -> NormalizedEventDocument {
    NormalizedEventDocument {
        event_name: "Show".into(),
        start_date: "1735689600".into(),
        end_date: "1735693200".into(),
        thumbnail: String::new(),
        url: url.into(),
        location: "Seattle".into(),
        place: String::new(),
        category: "Concert".into(),
        tags: tags.into(),
        artists: artists.into(),
        description: String::new(),
        source: "test".into(),
    }
}

#[tokio::test]
async fn processing_the_same_batch_twice_leaves_storage_unchanged() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let integrator = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));

    let batch = vec![
        doc("https://x/1", "The Band", "Rock"),
        doc("https://x/2", "Another Act, The Band", "Jazz, Rock"),
    ];

    integrator.process_batch(batch.clone()).await.unwrap();
    let urls_after_first = storage.seen_urls().await.unwrap();

    integrator.process_batch(batch).await.unwrap();
    let urls_after_second = storage.seen_urls().await.unwrap();

    assert_eq!(urls_after_first, urls_after_second);
    assert_eq!(urls_after_first.len(), 2);
}

#[tokio::test]
async fn urls_remain_unique_across_overlapping_batches() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let integrator = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));

    integrator.process_batch(vec![doc("https://x/1", "", "")]).await.unwrap();
    integrator.process_batch(vec![doc("https://x/1", "", ""), doc("https://x/2", "", "")]).await.unwrap();

    let urls = storage.seen_urls().await.unwrap();
    assert_eq!(urls.len(), 2);
}

#[tokio::test]
async fn relationships_survive_reprocessing_without_duplication() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let integrator = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));

    integrator.process_batch(vec![doc("https://x/1", "The Band, Another Act", "Rock")]).await.unwrap();
    let event = storage.find_event_by_url("https://x/1").await.unwrap().unwrap();
    let event_id = event.id.unwrap();
    let first_pass = storage.existing_relations(event_id, RelationKind::EventArtist).await.unwrap();
    assert_eq!(first_pass.len(), 2);

    integrator.process_batch(vec![doc("https://x/1", "The Band, Another Act", "Rock")]).await.unwrap();
    let second_pass = storage.existing_relations(event_id, RelationKind::EventArtist).await.unwrap();
    assert_eq!(second_pass, first_pass);
}

#[tokio::test]
async fn two_integrators_racing_on_overlapping_documents_converge_to_one_event() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let a = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));
    let b = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));

    let shared = doc("https://x/shared", "The Band", "Rock");
    let (r1, r2) = tokio::join!(
        a.process_batch(vec![shared.clone()]),
        b.process_batch(vec![shared]),
    );
    r1.unwrap();
    r2.unwrap();

    let urls = storage.seen_urls().await.unwrap();
    assert_eq!(urls.len(), 1);
}
