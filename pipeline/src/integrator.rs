use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use eventmesh_core::domain::{EntityKind, Event, NormalizedEventDocument, RelationKind};
use eventmesh_core::storage::Storage;
use tracing::warn;

use crate::error::Result;
use crate::linker::Linker;
use crate::observability::metrics;
use crate::registries::NameRegistry;
use crate::venues::VenueEnricher;

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped_seen: usize,
    pub errors: usize,
    pub timestamps_fabricated: usize,
}

/// Materializes a batch of normalized event documents: chunked, each
/// chunk isolated in its own transaction-equivalent unit, per-document
/// failures counted but never poisoning the rest of the chunk. The
/// first chunk runs immediately; every later chunk waits out one
/// `tick_interval` first, so a single slow batch can't starve whatever
/// else is sharing the integrator's connection pool. `in_flight` makes
/// a batch non-reentrant: a second `process_batch` call that arrives
/// while one is still ticking through its chunks is rejected rather
/// than interleaved with it.
pub struct Integrator {
    storage: Arc<dyn Storage>,
    artist_registry: NameRegistry,
    tag_registry: NameRegistry,
    linker: Linker,
    venue_enricher: Option<Arc<VenueEnricher>>,
    chunk_size: usize,
    tick_interval: Duration,
    in_flight: AtomicBool,
}

impl Integrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        venue_enricher: Option<Arc<VenueEnricher>>,
        chunk_size: usize,
        tick_interval: Duration,
    ) -> Self {
        Self {
            artist_registry: NameRegistry::new(EntityKind::Artist, storage.clone()),
            tag_registry: NameRegistry::new(EntityKind::Tag, storage.clone()),
            linker: Linker::new(storage.clone()),
            storage,
            venue_enricher,
            chunk_size,
            tick_interval,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn process_batch(&self, documents: Vec<NormalizedEventDocument>) -> Result<BatchReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("integrator batch already in flight, skipping overlapping call");
            return Ok(BatchReport::default());
        }
        let result = self.process_batch_inner(documents).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn process_batch_inner(&self, documents: Vec<NormalizedEventDocument>) -> Result<BatchReport> {
        let mut seen: HashSet<String> = self.storage.seen_urls().await?;
        let mut report = BatchReport::default();

        let mut chunks = documents.chunks(self.chunk_size.max(1));
        if let Some(first) = chunks.next() {
            self.process_chunk(first, &mut seen, &mut report).await?;
            metrics::integrator::chunk_processed(first.len());
        }

        if chunks.len() > 0 {
            let mut ticker = tokio::time::interval(self.tick_interval);
            ticker.tick().await;
            for chunk in chunks {
                ticker.tick().await;
                self.process_chunk(chunk, &mut seen, &mut report).await?;
                metrics::integrator::chunk_processed(chunk.len());
            }
        }

        Ok(report)
    }

    /// Scopes one chunk's writes in a storage transaction. Rollback only
    /// covers a failed `begin_chunk`/`commit_chunk` itself; a single
    /// document failing its own processing is still caught and counted by
    /// `process_chunk_inner` rather than poisoning the rest of the chunk.
    async fn process_chunk(&self, chunk: &[NormalizedEventDocument], seen: &mut HashSet<String>, report: &mut BatchReport) -> Result<()> {
        self.storage.begin_chunk().await?;
        self.process_chunk_inner(chunk, seen, report).await;
        match self.storage.commit_chunk().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "failed to commit chunk, rolling back");
                self.storage.rollback_chunk().await?;
                Err(e.into())
            }
        }
    }

    async fn process_chunk_inner(&self, chunk: &[NormalizedEventDocument], seen: &mut HashSet<String>, report: &mut BatchReport) {
        for doc in chunk {
            if doc.url.is_empty() || seen.contains(&doc.url) {
                report.skipped_seen += 1;
                metrics::integrator::document_skipped_seen();
                continue;
            }

            match self.process_document(doc).await {
                Ok(fabricated) => {
                    if fabricated {
                        report.timestamps_fabricated += 1;
                        metrics::integrator::timestamp_fabricated();
                    }
                    seen.insert(doc.url.clone());
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(url = %doc.url, error = %e, "failed to process document");
                    report.errors += 1;
                    metrics::integrator::document_error();
                }
            }
        }
    }

    async fn process_document(&self, doc: &NormalizedEventDocument) -> Result<bool> {
        let now = Utc::now();
        let (start_date, start_fabricated) = parse_timestamp(&doc.start_date, now);
        let (end_date, end_fabricated) = parse_timestamp(&doc.end_date, now + ChronoDuration::hours(1));

        let place_id = if let Some(enricher) = &self.venue_enricher {
            if doc.place.trim().is_empty() {
                None
            } else {
                enricher
                    .resolve_and_enrich(doc.place.trim(), doc.location.trim())
                    .await?
                    .map(|v| v.place_id)
            }
        } else {
            None
        };

        let mut event = Event::new(
            doc.event_name.clone(),
            start_date,
            end_date,
            non_empty(&doc.thumbnail),
            doc.url.clone(),
            non_empty(&doc.location),
            non_empty(&doc.category),
            non_empty(&doc.description),
            doc.source.clone(),
            place_id,
        );

        self.storage.upsert_event(&mut event).await?;
        let event_id = event.id.expect("upsert_event always assigns an id");

        let artist_names = split_csv(&doc.artists);
        if !artist_names.is_empty() {
            let resolved = self.artist_registry.find_or_create(&artist_names).await?;
            let ids: Vec<_> = resolved.values().copied().collect();
            self.linker.link(event_id, RelationKind::EventArtist, &ids).await?;
        }

        let tag_names = split_csv(&doc.tags);
        if !tag_names.is_empty() {
            let resolved = self.tag_registry.find_or_create(&tag_names).await?;
            let ids: Vec<_> = resolved.values().copied().collect();
            self.linker.link(event_id, RelationKind::EventTag, &ids).await?;
        }

        Ok(start_fabricated || end_fabricated)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Epoch seconds accepted; values with more than 10 digits are treated
/// as milliseconds. Unparseable or `"null"` values fall back to
/// `fallback` rather than dropping the event, flagged as fabricated so
/// the caller can count it.
fn parse_timestamp(raw: &str, fallback: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return (fallback, true);
    }

    match trimmed.parse::<i64>() {
        Ok(mut epoch) => {
            if trimmed.trim_start_matches('-').len() > 10 {
                epoch /= 1000;
            }
            match Utc.timestamp_opt(epoch, 0).single() {
                Some(dt) => (dt, false),
                None => (fallback, true),
            }
        }
        Err(_) => (fallback, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_milliseconds_and_seconds_to_the_same_instant() {
        let (ms, _) = parse_timestamp("1735689600000", Utc::now());
        let (secs, _) = parse_timestamp("1735689600", Utc::now());
        assert!((ms - secs).num_seconds().abs() <= 1);
        assert_eq!(ms.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn null_timestamp_falls_back_and_flags_fabrication() {
        let fallback = Utc::now();
        let (dt, fabricated) = parse_timestamp("null", fallback);
        assert!(fabricated);
        assert_eq!(dt, fallback);
    }

    #[test]
    fn unparseable_timestamp_falls_back_and_flags_fabrication() {
        let fallback = Utc::now();
        let (dt, fabricated) = parse_timestamp("not-a-number", fallback);
        assert!(fabricated);
        assert_eq!(dt, fallback);
    }

    #[tokio::test]
    async fn idempotent_ingestion_yields_stable_row_counts() {
        use crate::storage::InMemoryStorage;

        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let integrator = Integrator::new(storage.clone(), None, 50, Duration::from_secs(10));

        let doc = NormalizedEventDocument {
            event_name: "Show".into(),
            start_date: "1735689600".into(),
            end_date: "null".into(),
            thumbnail: String::new(),
            url: "https://x/1".into(),
            location: "Seattle".into(),
            place: String::new(),
            category: "Concert".into(),
            tags: "Rock, rock".into(),
            artists: "The Band".into(),
            description: String::new(),
            source: "test".into(),
        };

        integrator.process_batch(vec![doc.clone()]).await.unwrap();
        let first_urls = storage.seen_urls().await.unwrap().len();
        integrator.process_batch(vec![doc]).await.unwrap();
        let second_urls = storage.seen_urls().await.unwrap().len();

        assert_eq!(first_urls, second_urls);
        assert_eq!(first_urls, 1);
    }
}
