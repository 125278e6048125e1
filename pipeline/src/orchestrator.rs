use std::collections::HashSet;
use std::sync::Arc;

use eventmesh_core::domain::NormalizedEventDocument;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::adapters::SourceRegistry;
use crate::observability::metrics;

/// Output of one orchestrator run.
#[derive(Debug, Default)]
pub struct MergedResult {
    pub documents: Vec<NormalizedEventDocument>,
    pub duplicates_dropped: usize,
    pub adapter_errors: Vec<(String, String)>,
}

/// Runs every registered adapter in parallel on a bounded worker pool,
/// merges outputs by canonical URL (first-write-wins), and applies a
/// global cap post-merge. An adapter panicking or returning an error is
/// caught, logged, counted, and excluded from the merge without
/// aborting its siblings.
pub struct Orchestrator {
    registry: SourceRegistry,
    concurrency: usize,
    per_source_cap: usize,
    global_cap: usize,
}

impl Orchestrator {
    pub fn new(registry: SourceRegistry, concurrency: usize, per_source_cap: usize, global_cap: usize) -> Self {
        Self {
            registry,
            concurrency,
            per_source_cap,
            global_cap,
        }
    }

    pub async fn run(&self) -> MergedResult {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::new();

        for adapter in self.registry.all() {
            let semaphore = semaphore.clone();
            let cap = self.per_source_cap;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let name = adapter.name();
                let result = adapter.fetch_and_map(cap).await;
                (name, result)
            }));
        }

        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut merged = MergedResult::default();

        for handle in handles {
            match handle.await {
                Ok((name, Ok(docs))) => {
                    metrics::adapters::fetch_success(name, docs.len());
                    if docs.is_empty() {
                        metrics::adapters::empty_result_warning(name);
                    }
                    for doc in docs {
                        if seen_urls.insert(doc.url.clone()) {
                            merged.documents.push(doc);
                        } else {
                            merged.duplicates_dropped += 1;
                            metrics::orchestrator::duplicate_dropped(name);
                        }
                    }
                }
                Ok((name, Err(e))) => {
                    warn!(source = name, error = %e, "adapter failed");
                    metrics::adapters::fetch_error(name);
                    merged.adapter_errors.push((name.to_string(), e.to_string()));
                }
                Err(join_err) => {
                    warn!(error = %join_err, "adapter task panicked");
                    merged.adapter_errors.push(("unknown".to_string(), join_err.to_string()));
                }
            }
        }

        if merged.documents.len() > self.global_cap {
            merged.documents.truncate(self.global_cap);
        }

        metrics::orchestrator::merged_documents(merged.documents.len());
        info!(
            documents = merged.documents.len(),
            duplicates = merged.duplicates_dropped,
            errors = merged.adapter_errors.len(),
            "orchestrator run complete"
        );

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::adapters::SourceAdapter;
    use crate::error::{PipelineError, Result};

    struct FixedAdapter {
        name: &'static str,
        docs: Vec<NormalizedEventDocument>,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn fetch_and_map(&self, cap: usize) -> Result<Vec<NormalizedEventDocument>> {
            Ok(self.docs.iter().take(cap).cloned().collect())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn fetch_and_map(&self, _cap: usize) -> Result<Vec<NormalizedEventDocument>> {
            Err(PipelineError::Transient("boom".into()))
        }
    }

    fn doc(url: &str) -> NormalizedEventDocument {
        NormalizedEventDocument {
            event_name: "Show".into(),
            start_date: "null".into(),
            end_date: "null".into(),
            thumbnail: String::new(),
            url: url.into(),
            location: String::new(),
            place: String::new(),
            category: String::new(),
            tags: String::new(),
            artists: String::new(),
            description: String::new(),
            source: "test".into(),
        }
    }

    #[tokio::test]
    async fn merges_and_dedupes_by_url_first_write_wins() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FixedAdapter {
            name: "a",
            docs: vec![doc("https://x/1"), doc("https://x/2")],
        }));
        registry.register(Arc::new(FixedAdapter {
            name: "b",
            docs: vec![doc("https://x/2"), doc("https://x/3")],
        }));

        let orchestrator = Orchestrator::new(registry, 4, 3000, 3000);
        let merged = orchestrator.run().await;

        let mut urls: Vec<&str> = merged.documents.iter().map(|d| d.url.as_str()).collect();
        urls.sort();
        assert_eq!(urls, vec!["https://x/1", "https://x/2", "https://x/3"]);
        assert_eq!(merged.duplicates_dropped, 1);
    }

    #[tokio::test]
    async fn failing_adapter_does_not_affect_siblings() {
        let _ = AtomicUsize::new(0);
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FixedAdapter {
            name: "a",
            docs: vec![doc("https://x/1")],
        }));
        registry.register(Arc::new(FailingAdapter));

        let orchestrator = Orchestrator::new(registry, 4, 3000, 3000);
        let merged = orchestrator.run().await;

        assert_eq!(merged.documents.len(), 1);
        assert_eq!(merged.adapter_errors.len(), 1);
    }

    #[tokio::test]
    async fn global_cap_truncates_post_merge() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FixedAdapter {
            name: "a",
            docs: vec![doc("https://x/1"), doc("https://x/2"), doc("https://x/3")],
        }));

        let orchestrator = Orchestrator::new(registry, 4, 3000, 2);
        let merged = orchestrator.run().await;
        assert_eq!(merged.documents.len(), 2);
    }
}
