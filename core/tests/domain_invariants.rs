use chrono::Utc;
use eventmesh_core::domain::{Artist, Event, Venue, DEFAULT_VECTOR_DIM};

#[test]
fn artist_name_uniqueness_is_case_sensitive_after_trim() {
    assert_eq!(Artist::normalize_name("  The Band  "), "The Band");
    assert_ne!(Artist::normalize_name("The Band"), Artist::normalize_name("the band"));
}

#[test]
fn event_start_and_end_round_trip() {
    let start = Utc::now();
    let end = start + chrono::Duration::hours(2);
    let event = Event::new(
        "Release Show".into(),
        start,
        end,
        None,
        "https://example.com/events/1".into(),
        Some("Seattle, WA".into()),
        Some("music".into()),
        None,
        "test-source".into(),
        None,
    );
    assert!(event.start_date <= event.end_date);
    assert_eq!(event.embedding(), None);
}

#[test]
fn venue_stub_has_no_popularity_until_rated() {
    let venue = Venue::stub("place-123".into(), "The Crocodile".into());
    assert_eq!(venue.rating, None);
    assert_eq!(venue.popularity_score(), None);
    assert!(venue.last_enriched().is_none());
}

#[test]
fn vector_dim_constant_matches_spec_default() {
    assert_eq!(DEFAULT_VECTOR_DIM, 1536);
}
