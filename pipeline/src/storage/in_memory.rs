use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use eventmesh_core::domain::{EntityKind, Event, RelationKind, Venue};
use eventmesh_core::error::{CoreError, Result};
use eventmesh_core::storage::{ChangeOutcome, Storage};
use uuid::Uuid;

/// Development/test storage, mirroring the teacher's `InMemoryStorage`:
/// plain `HashMap`s behind `Mutex`es, no real concurrency hazards since
/// every operation is a single critical section with no `.await` inside
/// the lock.
#[derive(Default)]
pub struct InMemoryStorage {
    events: Mutex<HashMap<Uuid, Event>>,
    events_by_url: Mutex<HashMap<String, Uuid>>,
    artists: Mutex<HashMap<Uuid, String>>,
    tags: Mutex<HashMap<Uuid, String>>,
    venues: Mutex<HashMap<String, Venue>>,
    place_cache: Mutex<HashMap<(String, String), String>>,
    event_artists: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    event_tags: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn relation_map(&self, kind: RelationKind) -> &Mutex<HashMap<Uuid, HashSet<Uuid>>> {
        match kind {
            RelationKind::EventArtist => &self.event_artists,
            RelationKind::EventTag => &self.event_tags,
        }
    }

    fn entity_map(&self, kind: EntityKind) -> &Mutex<HashMap<Uuid, String>> {
        match kind {
            EntityKind::Artist => &self.artists,
            EntityKind::Tag => &self.tags,
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn seen_urls(&self) -> Result<HashSet<String>> {
        Ok(self.events_by_url.lock().unwrap().keys().cloned().collect())
    }

    async fn find_event_by_url(&self, url: &str) -> Result<Option<Event>> {
        let by_url = self.events_by_url.lock().unwrap();
        let events = self.events.lock().unwrap();
        Ok(by_url.get(url).and_then(|id| events.get(id).cloned()))
    }

    async fn upsert_event(&self, event: &mut Event) -> Result<ChangeOutcome> {
        let mut by_url = self.events_by_url.lock().unwrap();
        let mut events = self.events.lock().unwrap();

        if let Some(existing_id) = by_url.get(&event.url).copied() {
            let existing = events.get(&existing_id).cloned();
            event.id = Some(existing_id);
            let outcome = if existing.as_ref() == Some(event) {
                ChangeOutcome::Unchanged
            } else {
                ChangeOutcome::Updated
            };
            events.insert(existing_id, event.clone());
            return Ok(outcome);
        }

        let id = Uuid::new_v4();
        event.id = Some(id);
        by_url.insert(event.url.clone(), id);
        events.insert(id, event.clone());
        Ok(ChangeOutcome::Created)
    }

    async fn get_event_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.events.lock().unwrap().get(&id).cloned())
    }

    async fn get_events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>> {
        let events = self.events.lock().unwrap();
        Ok(ids.iter().filter_map(|id| events.get(id).cloned()).collect())
    }

    async fn events_missing_embedding(&self, limit: usize) -> Result<Vec<Event>> {
        let events = self.events.lock().unwrap();
        Ok(events
            .values()
            .filter(|e| e.embedding().is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_event_embedding(&self, event_id: Uuid, vector: &[f32]) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let event = events
            .get_mut(&event_id)
            .ok_or_else(|| CoreError::NotFound(format!("event {event_id}")))?;
        event.set_embedding(vector.to_vec(), vector.len())?;
        Ok(())
    }

    async fn nearest_neighbors(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Uuid, f64)>> {
        let events = self.events.lock().unwrap();
        let mut scored: Vec<(Uuid, f64)> = events
            .values()
            .filter_map(|e| {
                let id = e.id?;
                let vector = e.embedding()?;
                Some((id, cosine_distance(query_vector, vector)))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn find_entities_by_name(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>> {
        let map = self.entity_map(kind).lock().unwrap();
        let wanted: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        Ok(map
            .iter()
            .filter(|(_, name)| wanted.contains(name.as_str()))
            .map(|(id, name)| (name.clone(), *id))
            .collect())
    }

    async fn insert_entities(&self, kind: EntityKind, names: &[String]) -> Result<HashMap<String, Uuid>> {
        let mut map = self.entity_map(kind).lock().unwrap();
        let mut result = HashMap::new();
        for name in names {
            if let Some((id, _)) = map.iter().find(|(_, n)| *n == name) {
                result.insert(name.clone(), *id);
                continue;
            }
            let id = Uuid::new_v4();
            map.insert(id, name.clone());
            result.insert(name.clone(), id);
        }
        Ok(result)
    }

    async fn existing_relations(&self, event_id: Uuid, kind: RelationKind) -> Result<HashSet<Uuid>> {
        Ok(self
            .relation_map(kind)
            .lock()
            .unwrap()
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_relations(&self, event_id: Uuid, kind: RelationKind, entity_ids: &[Uuid]) -> Result<usize> {
        let mut map = self.relation_map(kind).lock().unwrap();
        let entry = map.entry(event_id).or_default();
        let before = entry.len();
        for id in entity_ids {
            entry.insert(*id);
        }
        Ok(entry.len() - before)
    }

    async fn get_venue_by_place_id(&self, place_id: &str) -> Result<Option<Venue>> {
        Ok(self.venues.lock().unwrap().get(place_id).cloned())
    }

    async fn get_cached_place_id(&self, scraped_name: &str, location_hint: &str) -> Result<Option<String>> {
        Ok(self
            .place_cache
            .lock()
            .unwrap()
            .get(&(scraped_name.to_string(), location_hint.to_string()))
            .cloned())
    }

    async fn cache_place_id(&self, scraped_name: &str, location_hint: &str, place_id: &str) -> Result<()> {
        self.place_cache
            .lock()
            .unwrap()
            .insert((scraped_name.to_string(), location_hint.to_string()), place_id.to_string());
        Ok(())
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        self.venues.lock().unwrap().insert(venue.place_id.clone(), venue.clone());
        Ok(())
    }

    async fn stale_venues(&self, horizon_days: i64, limit: usize) -> Result<Vec<Venue>> {
        let now = Utc::now();
        let venues = self.venues.lock().unwrap();
        Ok(venues
            .values()
            .filter(|v| v.is_stale(now, horizon_days))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn begin_chunk(&self) -> Result<()> {
        Ok(())
    }

    async fn commit_chunk(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback_chunk(&self) -> Result<()> {
        Ok(())
    }
}
