//! Namespaced metrics recording for the pipeline, following the teacher's
//! `observability/metrics.rs`: thin module-scoped functions wrapping the
//! `metrics` crate's `counter!`/`histogram!` macros, backed by a
//! Prometheus exporter.

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the process-wide Prometheus recorder. Safe to call once at
/// startup; a second call is a no-op error that callers may ignore.
pub fn init() -> anyhow::Result<()> {
    PrometheusBuilder::new().install()?;
    Ok(())
}

pub mod adapters {
    pub fn fetch_success(source: &str, records: usize) {
        metrics::counter!("adapters_fetch_success_total", "source" => source.to_string()).increment(1);
        metrics::histogram!("adapters_fetch_records", "source" => source.to_string()).record(records as f64);
    }

    pub fn fetch_error(source: &str) {
        metrics::counter!("adapters_fetch_error_total", "source" => source.to_string()).increment(1);
    }

    pub fn empty_result_warning(source: &str) {
        metrics::counter!("adapters_fetch_empty_total", "source" => source.to_string()).increment(1);
    }
}

pub mod orchestrator {
    pub fn merged_documents(count: usize) {
        metrics::histogram!("orchestrator_merged_documents").record(count as f64);
    }

    pub fn duplicate_dropped(source: &str) {
        metrics::counter!("orchestrator_duplicates_dropped_total", "source" => source.to_string()).increment(1);
    }
}

pub mod registries {
    pub fn cache_hit(kind: &str) {
        metrics::counter!("registries_cache_hit_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn cache_miss(kind: &str, count: usize) {
        metrics::counter!("registries_cache_miss_total", "kind" => kind.to_string()).increment(count as u64);
    }

    pub fn race_retried(kind: &str) {
        metrics::counter!("registries_race_retried_total", "kind" => kind.to_string()).increment(1);
    }
}

pub mod linker {
    pub fn pairs_inserted(table: &str, count: usize) {
        metrics::counter!("linker_pairs_inserted_total", "table" => table.to_string()).increment(count as u64);
    }

    pub fn pairs_skipped_existing(table: &str, count: usize) {
        metrics::counter!("linker_pairs_skipped_total", "table" => table.to_string()).increment(count as u64);
    }

    pub fn race_swallowed(table: &str, count: usize) {
        metrics::counter!("linker_race_swallowed_total", "table" => table.to_string()).increment(count as u64);
    }
}

pub mod venues {
    pub fn resolved() {
        metrics::counter!("venues_resolved_total").increment(1);
    }

    pub fn stubbed() {
        metrics::counter!("venues_stubbed_total").increment(1);
    }

    pub fn enriched() {
        metrics::counter!("venues_enriched_total").increment(1);
    }

    pub fn refreshed() {
        metrics::counter!("venues_refreshed_total").increment(1);
    }

    pub fn circuit_open_fallback(op: &str) {
        metrics::counter!("venues_circuit_open_fallback_total", "op" => op.to_string()).increment(1);
    }

    pub fn retry_attempt(op: &str, attempt: u32) {
        metrics::counter!("venues_retry_attempt_total", "op" => op.to_string()).increment(1);
        metrics::histogram!("venues_retry_attempt_number", "op" => op.to_string()).record(attempt as f64);
    }
}

pub mod integrator {
    pub fn chunk_processed(chunk_size: usize) {
        metrics::counter!("integrator_chunks_processed_total").increment(1);
        metrics::histogram!("integrator_chunk_size").record(chunk_size as f64);
    }

    pub fn document_error() {
        metrics::counter!("integrator_document_errors_total").increment(1);
    }

    pub fn document_skipped_seen() {
        metrics::counter!("integrator_documents_skipped_seen_total").increment(1);
    }

    pub fn timestamp_fabricated() {
        metrics::counter!("integrator_timestamp_fabricated_total").increment(1);
    }
}

pub mod embedding {
    pub fn subbatch_success(size: usize) {
        metrics::counter!("embedding_subbatch_success_total").increment(1);
        metrics::histogram!("embedding_subbatch_size").record(size as f64);
    }

    pub fn subbatch_error() {
        metrics::counter!("embedding_subbatch_error_total").increment(1);
    }

    pub fn tokens_used(tokens: u64) {
        metrics::counter!("embedding_tokens_used_total").increment(tokens);
    }
}

pub mod similarity {
    pub fn query_served(result_count: usize) {
        metrics::counter!("similarity_queries_total").increment(1);
        metrics::histogram!("similarity_result_count").record(result_count as f64);
    }

    pub fn query_rejected_empty() {
        metrics::counter!("similarity_queries_rejected_total").increment(1);
    }

    pub fn query_degraded() {
        metrics::counter!("similarity_queries_degraded_total").increment(1);
    }
}
