use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Dimension every stored embedding must have. Configurable, but a
/// single deployment must agree on one value.
pub const DEFAULT_VECTOR_DIM: usize = 1536;

/// The single inter-stage contract between Source Adapters and the Event
/// Integrator. Every field is a plain string; numeric/temporal coercion
/// happens inside the integrator, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedEventDocument {
    pub event_name: String,
    /// epoch seconds as decimal digits, or "null"
    pub start_date: String,
    pub end_date: String,
    pub thumbnail: String,
    /// canonical, used as dedupe key
    pub url: String,
    pub location: String,
    /// scraped venue name
    pub place: String,
    pub category: String,
    /// comma-separated
    pub tags: String,
    /// comma-separated
    pub artists: String,
    pub description: String,
    /// adapter identifier
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Option<Uuid>,
    pub event_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub source: String,
    embedding: Option<Vec<f32>>,
    pub place_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_name: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        thumbnail: Option<String>,
        url: String,
        location: Option<String>,
        category: Option<String>,
        description: Option<String>,
        source: String,
        place_id: Option<String>,
    ) -> Self {
        Self {
            id: None,
            event_name,
            start_date,
            end_date,
            thumbnail,
            url,
            location,
            category,
            description,
            source,
            embedding: None,
            place_id,
            created_at: Utc::now(),
        }
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Set the embedding vector. Rejects anything but exactly `dim`
    /// floats — a stored vector must be null or exactly `dim` floats.
    pub fn set_embedding(&mut self, vector: Vec<f32>, dim: usize) -> Result<()> {
        if vector.len() != dim {
            return Err(CoreError::InvalidInput(format!(
                "embedding must have exactly {dim} floats, got {}",
                vector.len()
            )));
        }
        self.embedding = Some(vector);
        Ok(())
    }

    /// Null the vector to trigger regeneration on the next embedding
    /// sweep, e.g. after a major attribute change.
    pub fn invalidate_embedding(&mut self) {
        self.embedding = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    pub id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Artist {
    /// Trim-only normalization; artist names are unique case-sensitive
    /// after trim.
    pub fn normalize_name(raw: &str) -> String {
        raw.trim().to_string()
    }

    pub fn new(name: String) -> Self {
        Self {
            id: None,
            name,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Lowercase, collapse whitespace, map separators to space, strip
    /// non-alphanumerics, preserve diacritics.
    pub fn normalize_name(raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        let mut out = String::with_capacity(lowered.len());
        let mut last_was_space = false;
        for ch in lowered.chars() {
            let mapped = match ch {
                '_' | '-' => ' ',
                c if c.is_whitespace() => ' ',
                c if c.is_alphanumeric() => c,
                _ => continue,
            };
            if mapped == ' ' {
                if !last_was_space && !out.is_empty() {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(mapped);
                last_was_space = false;
            }
        }
        out.trim_end().to_string()
    }

    pub fn new(name: String) -> Self {
        Self {
            id: None,
            name,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    pub place_id: String,
    pub scraped_name: String,
    pub canonical_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub total_ratings: Option<i64>,
    popularity_score: Option<f64>,
    pub price_level: Option<i32>,
    pub types: Vec<String>,
    pub photo_ref: Option<String>,
    pub review_count: Option<i64>,
    last_enriched: Option<DateTime<Utc>>,
}

impl Venue {
    pub fn stub(place_id: String, scraped_name: String) -> Self {
        Self {
            place_id,
            scraped_name,
            canonical_name: None,
            address: None,
            latitude: None,
            longitude: None,
            city: None,
            country: None,
            street: None,
            neighborhood: None,
            postal_code: None,
            website: None,
            phone: None,
            rating: None,
            total_ratings: None,
            popularity_score: None,
            price_level: None,
            types: Vec::new(),
            photo_ref: None,
            review_count: None,
            last_enriched: None,
        }
    }

    pub fn last_enriched(&self) -> Option<DateTime<Utc>> {
        self.last_enriched
    }

    pub fn popularity_score(&self) -> Option<f64> {
        self.popularity_score
    }

    /// `last_enriched` must be monotone for a given venue.
    pub fn stamp_enriched(&mut self, at: DateTime<Utc>) -> Result<()> {
        if let Some(prev) = self.last_enriched {
            if at < prev {
                return Err(CoreError::InvalidInput(
                    "last_enriched must not move backwards".into(),
                ));
            }
        }
        self.last_enriched = Some(at);
        Ok(())
    }

    /// `rating == None` implies `popularity == None`; enforced here so
    /// no caller can set one without the other.
    pub fn set_rating_and_popularity(&mut self, rating: Option<f64>, popularity: Option<f64>) -> Result<()> {
        if rating.is_none() && popularity.is_some() {
            return Err(CoreError::InvalidInput(
                "popularity score must be null when rating is null".into(),
            ));
        }
        self.rating = rating;
        self.popularity_score = popularity;
        Ok(())
    }

    pub fn is_stale(&self, now: DateTime<Utc>, horizon_days: i64) -> bool {
        match self.last_enriched {
            None => true,
            Some(t) => (now - t).num_days() >= horizon_days,
        }
    }
}

/// Which naturally-keyed entity registry a batch of names resolves
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Tag,
}

impl EntityKind {
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Tag => "tags",
        }
    }

    pub fn name_column(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist_name",
            EntityKind::Tag => "tag_name",
        }
    }

    /// The per-kind name transform applied before lookup/insert.
    pub fn normalize(self, raw: &str) -> String {
        match self {
            EntityKind::Artist => Artist::normalize_name(raw),
            EntityKind::Tag => Tag::normalize_name(raw),
        }
    }
}

/// Names the join table a relationship pair belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    EventArtist,
    EventTag,
}

impl RelationKind {
    pub fn table_name(self) -> &'static str {
        match self {
            RelationKind::EventArtist => "event_artists",
            RelationKind::EventTag => "event_tags",
        }
    }

    pub fn entity_column(self) -> &'static str {
        match self {
            RelationKind::EventArtist => "artist_id",
            RelationKind::EventTag => "tag_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalization_collapses_variants() {
        assert_eq!(Tag::normalize_name("Rock Alternatywny"), "rock alternatywny");
        assert_eq!(Tag::normalize_name("rock-alternatywny"), "rock alternatywny");
        assert_eq!(Tag::normalize_name("Rock_Alternatywny"), "rock alternatywny");
    }

    #[test]
    fn tag_normalization_preserves_diacritics() {
        assert_eq!(Tag::normalize_name("Café Society!!"), "café society");
    }

    #[test]
    fn event_rejects_wrong_length_embedding() {
        let mut e = Event::new(
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
        assert!(e.set_embedding(vec![0.0; 10], DEFAULT_VECTOR_DIM).is_err());
        assert!(e.set_embedding(vec![0.0; DEFAULT_VECTOR_DIM], DEFAULT_VECTOR_DIM).is_ok());
        assert_eq!(e.embedding().unwrap().len(), DEFAULT_VECTOR_DIM);
    }

    #[test]
    fn venue_rejects_popularity_without_rating() {
        let mut v = Venue::stub("place-1".into(), "The Venue".into());
        assert!(v.set_rating_and_popularity(None, Some(80.0)).is_err());
        assert!(v.set_rating_and_popularity(Some(4.5), Some(80.0)).is_ok());
    }

    #[test]
    fn venue_last_enriched_is_monotone() {
        let mut v = Venue::stub("place-1".into(), "The Venue".into());
        let t1 = Utc::now();
        let t0 = t1 - chrono::Duration::days(1);
        v.stamp_enriched(t1).unwrap();
        assert!(v.stamp_enriched(t0).is_err());
    }
}
