use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{EntityKind, Event, RelationKind, Venue};
use crate::error::Result;

/// What happened to a row as a result of an upsert (used by the
/// integrator's overwrite-if-different policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Storage port. Every pipeline stage that touches persistence talks to
/// this trait, never to libSQL directly, mirroring the teacher's
/// `Storage` trait split between a port (here) and an adapter
/// (`pipeline::storage::LibsqlStorage`).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Every URL currently in `events`, primed once per integrator run.
    async fn seen_urls(&self) -> Result<HashSet<String>>;

    async fn find_event_by_url(&self, url: &str) -> Result<Option<Event>>;

    /// Insert the event if its URL is new, or overwrite-if-different an
    /// existing row with the same URL.
    async fn upsert_event(&self, event: &mut Event) -> Result<ChangeOutcome>;

    async fn get_event_by_id(&self, id: Uuid) -> Result<Option<Event>>;

    /// Batch hydrate; the caller is responsible for re-ordering the
    /// result to match a prior id ordering — hydration does not
    /// preserve input order.
    async fn get_events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>>;

    async fn events_missing_embedding(&self, limit: usize) -> Result<Vec<Event>>;

    async fn set_event_embedding(&self, event_id: Uuid, vector: &[f32]) -> Result<()>;

    /// Native vector nearest-neighbour query; returns `(event_id, cosine_distance)`
    /// pairs in ascending distance order, ties broken by id.
    async fn nearest_neighbors(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Uuid, f64)>>;

    /// Batch name -> id lookup for an entity registry.
    async fn find_entities_by_name(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>>;

    /// Batch insert of names not found by `find_entities_by_name`, as one
    /// statement over the whole name set. A name that lost a concurrent
    /// unique-name race is silently skipped rather than erroring; the
    /// returned map is resolved against whichever id actually won, so
    /// callers never see `CoreError::Race` from this path.
    async fn insert_entities(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>>;

    async fn existing_relations(&self, event_id: Uuid, kind: RelationKind) -> Result<HashSet<Uuid>>;

    async fn insert_relations(&self, event_id: Uuid, kind: RelationKind, entity_ids: &[Uuid]) -> Result<usize>;

    async fn get_venue_by_place_id(&self, place_id: &str) -> Result<Option<Venue>>;

    async fn get_cached_place_id(&self, scraped_name: &str, location_hint: &str) -> Result<Option<String>>;

    async fn cache_place_id(&self, scraped_name: &str, location_hint: &str, place_id: &str) -> Result<()>;

    async fn upsert_venue(&self, venue: &Venue) -> Result<()>;

    async fn stale_venues(&self, horizon_days: i64, limit: usize) -> Result<Vec<Venue>>;

    /// Opens a transaction scoping every write made until `commit_chunk`
    /// or `rollback_chunk`. An implementation backed by one connection
    /// per call site has nothing to scope and may treat this (and the
    /// other two) as a no-op — `InMemoryStorage` already serializes
    /// every mutation behind its own mutex, so a chunk there is atomic
    /// with or without this call.
    async fn begin_chunk(&self) -> Result<()>;

    /// Commits the transaction opened by `begin_chunk`.
    async fn commit_chunk(&self) -> Result<()>;

    /// Rolls back every write made since `begin_chunk`.
    async fn rollback_chunk(&self) -> Result<()>;
}
