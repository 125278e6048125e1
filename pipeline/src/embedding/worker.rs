use std::sync::Arc;
use std::time::Duration;

use eventmesh_core::storage::Storage;
use tracing::{info, warn};

use super::client::EmbeddingClient;
use super::text;
use crate::error::Result;
use crate::observability::metrics;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub attempted: usize,
    pub embedded: usize,
    pub subbatch_errors: usize,
}

/// Sweeps events with a null vector and fills them in.
pub struct EmbeddingWorker {
    storage: Arc<dyn Storage>,
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    subbatch_size: usize,
    inter_batch_sleep: Duration,
}

impl EmbeddingWorker {
    pub fn new(
        storage: Arc<dyn Storage>,
        client: Arc<dyn EmbeddingClient>,
        batch_size: usize,
        subbatch_size: usize,
        inter_batch_sleep: Duration,
    ) -> Self {
        Self {
            storage,
            client,
            batch_size,
            subbatch_size,
            inter_batch_sleep,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let events = self.storage.events_missing_embedding(self.batch_size).await?;
        let mut report = SweepReport {
            attempted: events.len(),
            ..Default::default()
        };

        for (i, chunk) in events.chunks(self.subbatch_size.max(1)).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.inter_batch_sleep).await;
            }

            let texts: Vec<String> = chunk
                .iter()
                .map(|event| text::compose(event, event.category.as_deref(), "", "", None))
                .collect();

            match self.client.embed_batch(&texts).await {
                Ok(result) => {
                    for (event, vector) in chunk.iter().zip(result.vectors.iter()) {
                        if let Some(id) = event.id {
                            if let Err(e) = self.storage.set_event_embedding(id, vector).await {
                                warn!(event_id = %id, error = %e, "failed to persist embedding");
                                report.subbatch_errors += 1;
                                continue;
                            }
                            report.embedded += 1;
                        }
                    }
                    metrics::embedding::subbatch_success(chunk.len());
                    if let Some(tokens) = result.tokens_used {
                        metrics::embedding::tokens_used(tokens);
                        info!(tokens, "embedding sub-batch token usage");
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "embedding sub-batch failed, continuing with remaining sub-batches");
                    metrics::embedding::subbatch_error();
                    report.subbatch_errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingBatchResult;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use eventmesh_core::domain::{Event, DEFAULT_VECTOR_DIM};
    use eventmesh_core::storage::ChangeOutcome;
    use chrono::Utc;

    struct FakeEmbeddingClient;

    #[async_trait]
    impl EmbeddingClient for FakeEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatchResult> {
            Ok(EmbeddingBatchResult {
                vectors: texts.iter().map(|_| vec![0.1_f32; DEFAULT_VECTOR_DIM]).collect(),
                tokens_used: Some(42),
            })
        }
    }

    #[tokio::test]
    async fn sweep_embeds_events_missing_vectors() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let mut event = Event::new(
            "Show".into(),
            Utc::now(),
            Utc::now(),
            None,
            "https://x/1".into(),
            None,
            None,
            None,
            "test".into(),
            None,
        );
        let outcome = storage.upsert_event(&mut event).await.unwrap();
        assert_eq!(outcome, ChangeOutcome::Created);

        let worker = EmbeddingWorker::new(storage.clone(), Arc::new(FakeEmbeddingClient), 1000, 20, Duration::from_millis(0));
        let report = worker.sweep().await.unwrap();

        assert_eq!(report.embedded, 1);
        let reloaded = storage.get_event_by_id(event.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(reloaded.embedding().unwrap().len(), DEFAULT_VECTOR_DIM);
    }
}
