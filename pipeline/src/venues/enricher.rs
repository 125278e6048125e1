use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use eventmesh_core::domain::Venue;
use eventmesh_core::storage::Storage;
use tracing::{info, warn};

use super::places_client::PlacesClient;
use super::popularity::compute_popularity;
use crate::error::Result;
use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, CircuitBreaker, RateLimiter};

/// A venue's lifecycle from first mention to fully enriched. Not held
/// as a field anywhere — each call to `resolve`/`enrich` computes which
/// transition applies and returns the resulting venue (or `None` for
/// `STUB`-with-no-id).
#[derive(Debug, Clone, PartialEq)]
pub enum VenueState {
    Unseen,
    Resolved { place_id: String },
    Enriched(Box<Venue>),
    Stub(Box<Venue>),
}

/// Wraps a `PlacesClient` with resilience decorators (rate limiter,
/// retry, circuit breaker) at the call boundary — the state machine
/// itself stays free of resilience concerns.
pub struct VenueEnricher {
    storage: Arc<dyn Storage>,
    places: Arc<dyn PlacesClient>,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry_max: u32,
    retry_base_delay: Duration,
    refresh_in_flight: Arc<AtomicBool>,
}

impl VenueEnricher {
    pub fn new(
        storage: Arc<dyn Storage>,
        places: Arc<dyn PlacesClient>,
        rate_limiter: RateLimiter,
        breaker: CircuitBreaker,
        retry_max: u32,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            storage,
            places,
            rate_limiter,
            breaker,
            retry_max,
            retry_base_delay,
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `(scrapedName, locationHint) -> placeId | none`. Falls back to
    /// `None` without an outbound call while the circuit is open.
    pub async fn resolve(&self, scraped_name: &str, location_hint: &str) -> Result<Option<String>> {
        if let Some(cached) = self.storage.get_cached_place_id(scraped_name, location_hint).await? {
            return Ok(Some(cached));
        }

        if !self.breaker.allow().await {
            metrics::venues::circuit_open_fallback("resolve");
            return Ok(None);
        }

        self.rate_limiter.acquire().await;
        let places = self.places.clone();
        let scraped_name_owned = scraped_name.to_string();
        let location_hint_owned = location_hint.to_string();
        let result = retry_with_backoff(self.retry_max, self.retry_base_delay, "places.resolve", || {
            let places = places.clone();
            let scraped_name = scraped_name_owned.clone();
            let location_hint = location_hint_owned.clone();
            async move { places.text_search(&scraped_name, &location_hint).await }
        })
        .await;

        match result {
            Ok(found) => {
                self.breaker.record(true).await;
                match found {
                    Some(hit) => {
                        self.storage.cache_place_id(scraped_name, location_hint, &hit.place_id).await?;
                        metrics::venues::resolved();
                        Ok(Some(hit.place_id))
                    }
                    None => Ok(None),
                }
            }
            Err(e) => {
                self.breaker.record(false).await;
                warn!(error = %e, "places resolve failed");
                Ok(None)
            }
        }
    }

    /// `placeId -> attributes`. On open circuit, returns the venue
    /// unchanged with `last_enriched` stamped to now so the refresh
    /// sweep doesn't tight-loop on it.
    pub async fn enrich(&self, place_id: &str, scraped_name: &str) -> Result<Venue> {
        let existing = self.storage.get_venue_by_place_id(place_id).await?;
        let mut venue = existing.unwrap_or_else(|| Venue::stub(place_id.to_string(), scraped_name.to_string()));

        if !self.breaker.allow().await {
            metrics::venues::circuit_open_fallback("enrich");
            venue.stamp_enriched(Utc::now())?;
            self.storage.upsert_venue(&venue).await?;
            return Ok(venue);
        }

        self.rate_limiter.acquire().await;
        let places = self.places.clone();
        let place_id_owned = place_id.to_string();
        let result = retry_with_backoff(self.retry_max, self.retry_base_delay, "places.enrich", || {
            let places = places.clone();
            let place_id = place_id_owned.clone();
            async move { places.details(&place_id).await }
        })
        .await;

        match result {
            Ok(details) => {
                self.breaker.record(true).await;
                venue.canonical_name = details.name.or(venue.canonical_name);
                venue.address = details.formatted_address;
                venue.latitude = details.latitude;
                venue.longitude = details.longitude;
                venue.city = details.city;
                venue.street = details.street;
                venue.neighborhood = details.neighborhood;
                venue.postal_code = details.postal_code;
                venue.country = details.country;
                venue.phone = details.phone;
                venue.website = details.website;
                venue.price_level = details.price_level;
                venue.types = details.types;
                venue.photo_ref = details.photo_ref;
                venue.review_count = details.review_count;

                let popularity = details.rating.map(|r| compute_popularity(Some(r), details.user_ratings_total.unwrap_or(0)));
                venue.set_rating_and_popularity(details.rating, popularity)?;
                venue.stamp_enriched(Utc::now())?;
                self.storage.upsert_venue(&venue).await?;
                metrics::venues::enriched();
                Ok(venue)
            }
            Err(e) => {
                self.breaker.record(false).await;
                warn!(error = %e, place_id, "places enrich failed, stubbing venue");
                venue.stamp_enriched(Utc::now())?;
                self.storage.upsert_venue(&venue).await?;
                metrics::venues::stubbed();
                Ok(venue)
            }
        }
    }

    /// Full resolve-then-enrich path for a freshly scraped venue string.
    /// Yields `None` when resolution finds no matching place.
    pub async fn resolve_and_enrich(&self, scraped_name: &str, location_hint: &str) -> Result<Option<Venue>> {
        match self.resolve(scraped_name, location_hint).await? {
            Some(place_id) => Ok(Some(self.enrich(&place_id, scraped_name).await?)),
            None => Ok(None),
        }
    }

    /// Sweep for venues past `places.refresh.days`. Non-reentrant: a
    /// call that arrives while a previous sweep is still running skips
    /// rather than running two sweeps concurrently against the same
    /// stale-venue set.
    pub async fn refresh_sweep(&self, horizon_days: i64, limit: usize) -> Result<usize> {
        if self.refresh_in_flight.swap(true, Ordering::SeqCst) {
            warn!("venue refresh sweep already in flight, skipping");
            return Ok(0);
        }
        let result = self.refresh_sweep_inner(horizon_days, limit).await;
        self.refresh_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn refresh_sweep_inner(&self, horizon_days: i64, limit: usize) -> Result<usize> {
        let stale = self.storage.stale_venues(horizon_days, limit).await?;
        let mut refreshed = 0;
        for venue in stale {
            self.enrich(&venue.place_id, &venue.scraped_name).await?;
            metrics::venues::refreshed();
            refreshed += 1;
        }
        Ok(refreshed)
    }

    /// Runs `refresh_sweep` once a day at `cron` ("HH:MM daily"), forever.
    /// Sleeps until the next occurrence of that time of day rather than
    /// polling on a short interval, so a sweep can never double-fire
    /// within the same day even if one run takes hours.
    pub async fn run_refresh_ticker(self: Arc<Self>, cron: &str, horizon_days: i64, limit: usize) -> ! {
        loop {
            let delay = delay_until_next_daily(cron, Utc::now());
            tokio::time::sleep(delay).await;
            info!(cron, "starting scheduled venue refresh sweep");
            match self.refresh_sweep(horizon_days, limit).await {
                Ok(refreshed) => info!(refreshed, "scheduled venue refresh sweep complete"),
                Err(e) => warn!(error = %e, "scheduled venue refresh sweep failed"),
            }
        }
    }
}

/// Parses `cron` as `"HH:MM daily"` and returns the `Duration` until the
/// next occurrence of that time of day, today if it hasn't passed yet,
/// tomorrow otherwise. Falls back to 24 hours on any other format.
fn delay_until_next_daily(cron: &str, now: DateTime<Utc>) -> Duration {
    let time_part = cron.split_whitespace().next().unwrap_or_default();
    let Some(target_time) = NaiveTime::parse_from_str(time_part, "%H:%M").ok() else {
        warn!(cron, "unrecognized refresh cron format, defaulting to a 24h cadence");
        return Duration::from_secs(24 * 60 * 60);
    };

    let today_target = now.date_naive().and_time(target_time).and_utc();
    let next = if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };

    (next - now).to_std().unwrap_or(Duration::from_secs(24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::super::places_client::{PlaceDetails, PlaceSearchResult};
    use crate::error::PipelineError;

    struct FlakyPlaces {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl PlacesClient for FlakyPlaces {
        async fn text_search(&self, _name: &str, _hint: &str) -> Result<Option<PlaceSearchResult>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                return Err(PipelineError::Transient("temporary".into()));
            }
            Ok(Some(PlaceSearchResult {
                place_id: "place-1".into(),
                name: "The Venue".into(),
            }))
        }

        async fn details(&self, _place_id: &str) -> Result<PlaceDetails> {
            Ok(PlaceDetails {
                rating: Some(4.5),
                user_ratings_total: Some(100),
                ..Default::default()
            })
        }
    }

    fn enricher_with(places: FlakyPlaces) -> VenueEnricher {
        VenueEnricher::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(places),
            RateLimiter::new(Duration::from_millis(0)),
            CircuitBreaker::new("places-test", 100, 10, 0.5, Duration::from_secs(30), 10),
            3,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn resolve_retries_then_succeeds() {
        let enricher = enricher_with(FlakyPlaces {
            calls: AtomicUsize::new(0),
            fail_first_n: 2,
        });
        let result = enricher.resolve("The Venue", "Seattle").await.unwrap();
        assert_eq!(result, Some("place-1".to_string()));
    }

    #[tokio::test]
    async fn enrich_populates_popularity_from_rating() {
        let enricher = enricher_with(FlakyPlaces {
            calls: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let venue = enricher.enrich("place-1", "The Venue").await.unwrap();
        assert!(venue.popularity_score().unwrap() > 0.0);
        assert!(venue.last_enriched().is_some());
    }

    #[tokio::test]
    async fn open_circuit_resolve_returns_none_without_calling() {
        let breaker = CircuitBreaker::new("places-test", 100, 2, 0.5, Duration::from_secs(30), 10);
        breaker.record(false).await;
        breaker.record(false).await;
        assert_eq!(breaker.state().await, crate::resilience::CircuitState::Open);

        let enricher = VenueEnricher::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(FlakyPlaces {
                calls: AtomicUsize::new(0),
                fail_first_n: 0,
            }),
            RateLimiter::new(Duration::from_millis(0)),
            breaker,
            3,
            Duration::from_millis(1),
        );

        let result = enricher.resolve("The Venue", "Seattle").await.unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn delay_until_next_daily_waits_for_later_today() {
        let now = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let delay = delay_until_next_daily("03:00 daily", now);
        assert_eq!(delay, Duration::from_secs(3600));
    }

    #[test]
    fn delay_until_next_daily_rolls_to_tomorrow_once_passed() {
        let now = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap();
        let delay = delay_until_next_daily("03:00 daily", now);
        assert_eq!(delay, Duration::from_secs(23 * 3600));
    }

    #[test]
    fn delay_until_next_daily_falls_back_on_bad_format() {
        let now = Utc::now();
        let delay = delay_until_next_daily("not-a-time", now);
        assert_eq!(delay, Duration::from_secs(24 * 60 * 60));
    }
}
