use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventmesh_core::domain::{EntityKind, Event, RelationKind, Venue};
use eventmesh_core::error::{CoreError, Result};
use eventmesh_core::storage::{ChangeOutcome, Storage};
use libsql::{params, Builder, Connection, Database};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

fn db_err(context: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::Transient(format!("{context}: {err}"))
}

/// libSQL/Turso-backed storage, grounded on the teacher's `DatabaseManager`
/// (remote connection, `include_str!` migrations, explicit
/// `ON CONFLICT DO UPDATE` upserts instead of destructive `REPLACE`).
/// Vectors live in a native `F32_BLOB` column so `nearest_neighbors` runs
/// as a single `vector_distance_cos` query instead of hydrating every
/// embedding into the application.
///
/// Unlike the teacher, which opens a fresh `Connection` per call, a
/// `BEGIN`/`COMMIT` pair has to run on the same connection, so this holds
/// one `conn` for the lifetime of the storage and serializes chunk
/// transactions against it with `chunk_gate`: `begin_chunk` takes the gate
/// and parks the guard in `active_chunk` until `commit_chunk`/`rollback_chunk`
/// drops it, so a second chunk's `begin_chunk` blocks until the first is done.
pub struct LibsqlStorage {
    db: Database,
    conn: Connection,
    chunk_gate: Arc<AsyncMutex<()>>,
    active_chunk: AsyncMutex<Option<OwnedMutexGuard<()>>>,
}

impl LibsqlStorage {
    pub async fn connect() -> Result<Self> {
        let url = env::var("LIBSQL_URL")
            .map_err(|_| CoreError::InvalidInput("LIBSQL_URL not set".into()))?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN").unwrap_or_default();

        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| db_err("connecting to libsql", e))?;
        let conn = db.connect().map_err(|e| db_err("getting connection", e))?;

        Ok(Self {
            db,
            conn,
            chunk_gate: Arc::new(AsyncMutex::new(())),
            active_chunk: AsyncMutex::new(None),
        })
    }

    #[cfg(test)]
    pub async fn in_memory_for_test() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| db_err("opening in-memory libsql", e))?;
        let conn = db.connect().map_err(|e| db_err("getting connection", e))?;
        Ok(Self {
            db,
            conn,
            chunk_gate: Arc::new(AsyncMutex::new(())),
            active_chunk: AsyncMutex::new(None),
        })
    }

    fn conn(&self) -> Result<Connection> {
        Ok(self.conn.clone())
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_create_schema.sql"))
            .await
            .map_err(|e| db_err("running schema migration", e))?;
        conn.execute_batch(include_str!("../../../migrations/002_indexes.sql"))
            .await
            .map_err(|e| db_err("running index migration", e))?;
        Ok(())
    }

    fn vector_literal(vector: &[f32]) -> String {
        let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
        format!("[{}]", parts.join(","))
    }

    async fn row_to_event(row: &libsql::Row) -> Result<Event> {
        let id: String = row.get(0).map_err(|e| db_err("reading event id", e))?;
        let event_name: String = row.get(1).map_err(|e| db_err("reading event_name", e))?;
        let start_date: String = row.get(2).map_err(|e| db_err("reading start_date", e))?;
        let end_date: String = row.get(3).map_err(|e| db_err("reading end_date", e))?;
        let thumbnail: Option<String> = row.get(4).map_err(|e| db_err("reading thumbnail", e))?;
        let url: String = row.get(5).map_err(|e| db_err("reading url", e))?;
        let location: Option<String> = row.get(6).map_err(|e| db_err("reading location", e))?;
        let category: Option<String> = row.get(7).map_err(|e| db_err("reading category", e))?;
        let description: Option<String> = row.get(8).map_err(|e| db_err("reading description", e))?;
        let source: String = row.get(9).map_err(|e| db_err("reading source", e))?;
        let place_id: Option<String> = row.get(10).map_err(|e| db_err("reading place_id", e))?;
        let created_at: String = row.get(11).map_err(|e| db_err("reading created_at", e))?;

        let mut event = Event::new(
            event_name,
            parse_ts(&start_date)?,
            parse_ts(&end_date)?,
            thumbnail,
            url,
            location,
            category,
            description,
            source,
            place_id,
        );
        event.id = Some(Uuid::parse_str(&id).map_err(|e| db_err("parsing event id", e))?);
        event.created_at = parse_ts(&created_at)?;
        Ok(event)
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| db_err("parsing timestamp", e))
}

#[async_trait]
impl Storage for LibsqlStorage {
    async fn seen_urls(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query("SELECT url FROM events", params![])
            .await
            .map_err(|e| db_err("selecting urls", e))?;
        let mut out = HashSet::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating urls", e))? {
            out.insert(row.get::<String>(0).map_err(|e| db_err("reading url", e))?);
        }
        Ok(out)
    }

    async fn find_event_by_url(&self, url: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, event_name, start_date, end_date, thumbnail, url, location, category, \
                 description, source, place_id, created_at FROM events WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(|e| db_err("selecting event by url", e))?;
        match rows.next().await.map_err(|e| db_err("iterating event", e))? {
            Some(row) => Ok(Some(LibsqlStorage::row_to_event(&row).await?)),
            None => Ok(None),
        }
    }

    async fn upsert_event(&self, event: &mut Event) -> Result<ChangeOutcome> {
        let existing = self.find_event_by_url(&event.url).await?;
        let id = existing.as_ref().and_then(|e| e.id).unwrap_or_else(Uuid::new_v4);
        event.id = Some(id);

        let outcome = match &existing {
            None => ChangeOutcome::Created,
            Some(prev) if prev == event => ChangeOutcome::Unchanged,
            Some(_) => ChangeOutcome::Updated,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (id, event_name, start_date, end_date, thumbnail, url, location, \
             category, description, source, place_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             ON CONFLICT(url) DO UPDATE SET \
               event_name = excluded.event_name, \
               start_date = excluded.start_date, \
               end_date = excluded.end_date, \
               thumbnail = excluded.thumbnail, \
               location = excluded.location, \
               category = excluded.category, \
               description = excluded.description, \
               source = excluded.source, \
               place_id = excluded.place_id",
            params![
                id.to_string(),
                event.event_name.clone(),
                event.start_date.to_rfc3339(),
                event.end_date.to_rfc3339(),
                event.thumbnail.clone(),
                event.url.clone(),
                event.location.clone(),
                event.category.clone(),
                event.description.clone(),
                event.source.clone(),
                event.place_id.clone(),
                event.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| db_err("upserting event", e))?;

        Ok(outcome)
    }

    async fn get_event_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, event_name, start_date, end_date, thumbnail, url, location, category, \
                 description, source, place_id, created_at FROM events WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| db_err("selecting event by id", e))?;
        match rows.next().await.map_err(|e| db_err("iterating event", e))? {
            Some(row) => Ok(Some(LibsqlStorage::row_to_event(&row).await?)),
            None => Ok(None),
        }
    }

    async fn get_events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.get_event_by_id(*id).await? {
                out.push(event);
            }
        }
        Ok(out)
    }

    async fn events_missing_embedding(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, event_name, start_date, end_date, thumbnail, url, location, category, \
                 description, source, place_id, created_at FROM events WHERE embedding IS NULL LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| db_err("selecting events missing embedding", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating events", e))? {
            out.push(LibsqlStorage::row_to_event(&row).await?);
        }
        Ok(out)
    }

    async fn set_event_embedding(&self, event_id: Uuid, vector: &[f32]) -> Result<()> {
        let conn = self.conn()?;
        let literal = Self::vector_literal(vector);
        conn.execute(
            &format!(
                "UPDATE events SET embedding = vector32('{literal}') WHERE id = ?1"
            ),
            params![event_id.to_string()],
        )
        .await
        .map_err(|e| db_err("setting event embedding", e))?;
        Ok(())
    }

    async fn nearest_neighbors(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Uuid, f64)>> {
        let conn = self.conn()?;
        let literal = Self::vector_literal(query_vector);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, vector_distance_cos(embedding, vector32('{literal}')) AS distance \
                     FROM events WHERE embedding IS NOT NULL ORDER BY distance ASC, id ASC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| db_err("querying nearest neighbors", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating neighbors", e))? {
            let id: String = row.get(0).map_err(|e| db_err("reading neighbor id", e))?;
            let distance: f64 = row.get(1).map_err(|e| db_err("reading distance", e))?;
            out.push((Uuid::parse_str(&id).map_err(|e| db_err("parsing neighbor id", e))?, distance));
        }
        Ok(out)
    }

    async fn find_entities_by_name(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn()?;
        let placeholders = (1..=names.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, {col} FROM {table} WHERE {col} IN ({placeholders})",
            col = kind.name_column(),
            table = kind.table_name()
        );
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(names.iter().cloned()))
            .await
            .map_err(|e| db_err("looking up entities", e))?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating entities", e))? {
            let id: String = row.get(0).map_err(|e| db_err("reading entity id", e))?;
            let name: String = row.get(1).map_err(|e| db_err("reading entity name", e))?;
            out.insert(name, Uuid::parse_str(&id).map_err(|e| db_err("parsing entity id", e))?);
        }
        Ok(out)
    }

    async fn insert_entities(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn()?;
        let ids: Vec<Uuid> = names.iter().map(|_| Uuid::new_v4()).collect();
        let row_placeholders = (0..names.len())
            .map(|i| format!("(?{}, ?{})", i * 2 + 1, i * 2 + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {table} (id, {col}) VALUES {row_placeholders}",
            table = kind.table_name(),
            col = kind.name_column()
        );
        let mut values = Vec::with_capacity(names.len() * 2);
        for (id, name) in ids.iter().zip(names.iter()) {
            values.push(id.to_string());
            values.push(name.clone());
        }
        conn.execute(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| db_err("inserting entities", e))?;

        // A name that raced with another writer was ignored above, not
        // inserted under our id; re-read to pick up whichever id won.
        self.find_entities_by_name(kind, names).await
    }

    async fn existing_relations(&self, event_id: Uuid, kind: RelationKind) -> Result<HashSet<Uuid>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {col} FROM {table} WHERE event_id = ?1",
            col = kind.entity_column(),
            table = kind.table_name()
        );
        let mut rows = conn
            .query(&sql, params![event_id.to_string()])
            .await
            .map_err(|e| db_err("selecting relations", e))?;
        let mut out = HashSet::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating relations", e))? {
            let id: String = row.get(0).map_err(|e| db_err("reading relation id", e))?;
            out.insert(Uuid::parse_str(&id).map_err(|e| db_err("parsing relation id", e))?);
        }
        Ok(out)
    }

    async fn insert_relations(&self, event_id: Uuid, kind: RelationKind, entity_ids: &[Uuid]) -> Result<usize> {
        let conn = self.conn()?;
        let mut inserted = 0;
        for entity_id in entity_ids {
            let sql = format!(
                "INSERT OR IGNORE INTO {table} (event_id, {col}) VALUES (?1, ?2)",
                table = kind.table_name(),
                col = kind.entity_column()
            );
            let changed = conn
                .execute(&sql, params![event_id.to_string(), entity_id.to_string()])
                .await
                .map_err(|e| db_err("inserting relation", e))?;
            inserted += changed as usize;
        }
        Ok(inserted)
    }

    async fn get_venue_by_place_id(&self, place_id: &str) -> Result<Option<Venue>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT place_id, scraped_name, canonical_name, address, latitude, longitude, city, \
                 country, street, neighborhood, postal_code, website, phone, rating, total_ratings, \
                 popularity_score, price_level, types, photo_ref, review_count, last_enriched \
                 FROM places WHERE place_id = ?1",
                params![place_id],
            )
            .await
            .map_err(|e| db_err("selecting venue", e))?;
        match rows.next().await.map_err(|e| db_err("iterating venue", e))? {
            Some(row) => Ok(Some(row_to_venue(&row).await?)),
            None => Ok(None),
        }
    }

    async fn get_cached_place_id(&self, scraped_name: &str, location_hint: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT place_id FROM place_name_cache WHERE scraped_name = ?1 AND location_hint = ?2",
                params![scraped_name, location_hint],
            )
            .await
            .map_err(|e| db_err("selecting cached place id", e))?;
        match rows.next().await.map_err(|e| db_err("iterating cache", e))? {
            Some(row) => Ok(Some(row.get(0).map_err(|e| db_err("reading place id", e))?)),
            None => Ok(None),
        }
    }

    async fn cache_place_id(&self, scraped_name: &str, location_hint: &str, place_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO place_name_cache (scraped_name, location_hint, place_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT(scraped_name, location_hint) DO UPDATE SET place_id = excluded.place_id",
            params![scraped_name, location_hint, place_id],
        )
        .await
        .map_err(|e| db_err("caching place id", e))?;
        Ok(())
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO places (place_id, scraped_name, canonical_name, address, latitude, longitude, \
             city, country, street, neighborhood, postal_code, website, phone, rating, total_ratings, \
             popularity_score, price_level, types, photo_ref, review_count, last_enriched) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21) \
             ON CONFLICT(place_id) DO UPDATE SET \
               scraped_name = excluded.scraped_name, \
               canonical_name = excluded.canonical_name, \
               address = excluded.address, \
               latitude = excluded.latitude, \
               longitude = excluded.longitude, \
               city = excluded.city, \
               country = excluded.country, \
               street = excluded.street, \
               neighborhood = excluded.neighborhood, \
               postal_code = excluded.postal_code, \
               website = excluded.website, \
               phone = excluded.phone, \
               rating = excluded.rating, \
               total_ratings = excluded.total_ratings, \
               popularity_score = excluded.popularity_score, \
               price_level = excluded.price_level, \
               types = excluded.types, \
               photo_ref = excluded.photo_ref, \
               review_count = excluded.review_count, \
               last_enriched = excluded.last_enriched",
            params![
                venue.place_id.clone(),
                venue.scraped_name.clone(),
                venue.canonical_name.clone(),
                venue.address.clone(),
                venue.latitude,
                venue.longitude,
                venue.city.clone(),
                venue.country.clone(),
                venue.street.clone(),
                venue.neighborhood.clone(),
                venue.postal_code.clone(),
                venue.website.clone(),
                venue.phone.clone(),
                venue.rating,
                venue.total_ratings,
                venue.popularity_score(),
                venue.price_level,
                venue.types.join(","),
                venue.photo_ref.clone(),
                venue.review_count,
                venue.last_enriched().map(|t| t.to_rfc3339()),
            ],
        )
        .await
        .map_err(|e| db_err("upserting venue", e))?;
        Ok(())
    }

    async fn stale_venues(&self, horizon_days: i64, limit: usize) -> Result<Vec<Venue>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT place_id, scraped_name, canonical_name, address, latitude, longitude, city, \
                 country, street, neighborhood, postal_code, website, phone, rating, total_ratings, \
                 popularity_score, price_level, types, photo_ref, review_count, last_enriched \
                 FROM places WHERE last_enriched IS NULL \
                    OR julianday('now') - julianday(last_enriched) >= ?1 \
                 LIMIT ?2",
                params![horizon_days, limit as i64],
            )
            .await
            .map_err(|e| db_err("selecting stale venues", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| db_err("iterating venues", e))? {
            out.push(row_to_venue(&row).await?);
        }
        Ok(out)
    }

    async fn begin_chunk(&self) -> Result<()> {
        let guard = self.chunk_gate.clone().lock_owned().await;
        self.conn
            .execute("BEGIN", params![])
            .await
            .map_err(|e| db_err("beginning chunk transaction", e))?;
        *self.active_chunk.lock().await = Some(guard);
        Ok(())
    }

    async fn commit_chunk(&self) -> Result<()> {
        self.conn
            .execute("COMMIT", params![])
            .await
            .map_err(|e| db_err("committing chunk transaction", e))?;
        self.active_chunk.lock().await.take();
        Ok(())
    }

    async fn rollback_chunk(&self) -> Result<()> {
        self.conn
            .execute("ROLLBACK", params![])
            .await
            .map_err(|e| db_err("rolling back chunk transaction", e))?;
        self.active_chunk.lock().await.take();
        Ok(())
    }
}

async fn row_to_venue(row: &libsql::Row) -> Result<Venue> {
    let place_id: String = row.get(0).map_err(|e| db_err("reading place_id", e))?;
    let scraped_name: String = row.get(1).map_err(|e| db_err("reading scraped_name", e))?;
    let mut venue = Venue::stub(place_id, scraped_name);

    venue.canonical_name = row.get(2).map_err(|e| db_err("reading canonical_name", e))?;
    venue.address = row.get(3).map_err(|e| db_err("reading address", e))?;
    venue.latitude = row.get(4).map_err(|e| db_err("reading latitude", e))?;
    venue.longitude = row.get(5).map_err(|e| db_err("reading longitude", e))?;
    venue.city = row.get(6).map_err(|e| db_err("reading city", e))?;
    venue.country = row.get(7).map_err(|e| db_err("reading country", e))?;
    venue.street = row.get(8).map_err(|e| db_err("reading street", e))?;
    venue.neighborhood = row.get(9).map_err(|e| db_err("reading neighborhood", e))?;
    venue.postal_code = row.get(10).map_err(|e| db_err("reading postal_code", e))?;
    venue.website = row.get(11).map_err(|e| db_err("reading website", e))?;
    venue.phone = row.get(12).map_err(|e| db_err("reading phone", e))?;

    let rating: Option<f64> = row.get(13).map_err(|e| db_err("reading rating", e))?;
    let popularity: Option<f64> = row.get(15).map_err(|e| db_err("reading popularity_score", e))?;
    venue.total_ratings = row.get(14).map_err(|e| db_err("reading total_ratings", e))?;
    venue
        .set_rating_and_popularity(rating, popularity)
        .map_err(|e| db_err("restoring rating/popularity", e))?;

    venue.price_level = row.get(16).map_err(|e| db_err("reading price_level", e))?;
    let types: String = row.get(17).unwrap_or_default();
    venue.types = if types.is_empty() {
        Vec::new()
    } else {
        types.split(',').map(|s| s.to_string()).collect()
    };
    venue.photo_ref = row.get(18).map_err(|e| db_err("reading photo_ref", e))?;
    venue.review_count = row.get(19).map_err(|e| db_err("reading review_count", e))?;

    let last_enriched: Option<String> = row.get(20).map_err(|e| db_err("reading last_enriched", e))?;
    if let Some(raw) = last_enriched {
        venue
            .stamp_enriched(parse_ts(&raw)?)
            .map_err(|e| db_err("restoring last_enriched", e))?;
    }

    Ok(venue)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn migrated() -> LibsqlStorage {
        let storage = LibsqlStorage::in_memory_for_test().await.unwrap();
        storage.run_migrations().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn rollback_chunk_discards_writes_made_since_begin_chunk() {
        let storage = migrated().await;
        let names = vec!["The Band".to_string()];

        storage.begin_chunk().await.unwrap();
        storage.insert_entities(EntityKind::Artist, &names).await.unwrap();
        storage.rollback_chunk().await.unwrap();

        let found = storage.find_entities_by_name(EntityKind::Artist, &names).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn commit_chunk_persists_writes_made_since_begin_chunk() {
        let storage = migrated().await;
        let names = vec!["The Band".to_string()];

        storage.begin_chunk().await.unwrap();
        storage.insert_entities(EntityKind::Artist, &names).await.unwrap();
        storage.commit_chunk().await.unwrap();

        let found = storage.find_entities_by_name(EntityKind::Artist, &names).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
