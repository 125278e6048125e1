use chrono::{DateTime, Datelike, Timelike, Utc};
use eventmesh_core::domain::{Event, Venue};

use crate::venues::{compute_popularity, popularity_band, venue_city_phrase};

fn season(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "winter",
        3 | 4 | 5 => "spring",
        6 | 7 | 8 => "summer",
        _ => "autumn",
    }
}

fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

fn time_block(start: DateTime<Utc>) -> String {
    let weekday = start.weekday();
    let is_weekend = matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun);
    let day_kind = if is_weekend { "weekend" } else { "weekday" };
    let time_kind = time_of_day(start.hour());
    let season_kind = season(start.month());
    format!("A {day_kind} {time_kind} event in {season_kind}.")
}

fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.chars() {
        let keep = ch.is_alphabetic() || ch.is_ascii_digit() || matches!(ch, '.' | ',' | '!' | '?' | '\'' | '-' | ' ');
        if !keep {
            continue;
        }
        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Composes the redundant, name/artist-biased text an event is embedded
/// from. Field order, repetition, and bucket thresholds are exact;
/// unavailable fields are simply omitted, not replaced by placeholders.
pub fn compose(
    event: &Event,
    category: Option<&str>,
    artists_csv: &str,
    tags_csv: &str,
    venue: Option<&Venue>,
) -> String {
    let mut parts = Vec::new();

    parts.push(format!("Event: {0}. Title: {0}.", event.event_name));

    if let Some(category) = category.filter(|c| !c.is_empty()) {
        parts.push(format!("Category: {category}."));
    }

    let artists = split_csv(artists_csv);
    if !artists.is_empty() {
        let list = artists.join(", ");
        parts.push(format!("Artists: {list}. Performers: {list}."));
    }

    let tags = split_csv(tags_csv);
    if !tags.is_empty() {
        parts.push(format!("Tags: {}.", tags.join(", ")));
    }

    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        parts.push(format!("Location: {location}."));
    }

    if let Some(venue) = venue {
        let mut venue_block = String::new();
        if !venue.types.is_empty() {
            venue_block.push_str(&format!("Venue Type: {}. ", venue.types.join(", ")));
        }
        if let Some(rating) = venue.rating {
            venue_block.push_str(&format!("Venue Rating: {rating} stars"));
            if let Some(total) = venue.total_ratings {
                venue_block.push_str(&format!(" based on {total} reviews"));
            }
            venue_block.push('.');
        }

        let score = venue.popularity_score().unwrap_or_else(|| compute_popularity(venue.rating, venue.total_ratings.unwrap_or(0)));
        if score > 0.0 {
            let band = popularity_band(score);
            let city = venue.city.as_deref().unwrap_or("the area");
            venue_block.push_str(&format!(" A {band} venue, {}.", venue_city_phrase(score, city)));
        }

        if !venue_block.trim().is_empty() {
            parts.push(venue_block.trim().to_string());
        }
    }

    parts.push(time_block(event.start_date));

    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        let truncated: String = description.chars().take(1000).collect();
        parts.push(format!("Description: {truncated}."));
    }

    clean_text(&parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_event() -> Event {
        Event::new(
            "Midnight Show".into(),
            Utc.with_ymd_and_hms(2026, 7, 25, 21, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 25, 23, 0, 0).unwrap(),
            None,
            "https://x/1".into(),
            Some("Capitol Hill".into()),
            Some("Concert".into()),
            Some("A night of music.".into()),
            "test".into(),
            None,
        )
    }

    #[test]
    fn repeats_name_and_artists_for_emphasis() {
        let event = base_event();
        let text = compose(&event, Some("Concert"), "The Band, Another Act", "", None);
        assert!(text.contains("Event: Midnight Show. Title: Midnight Show."));
        assert!(text.contains("Artists: The Band, Another Act. Performers: The Band, Another Act."));
    }

    #[test]
    fn high_popularity_venue_text_includes_band_and_city_phrase() {
        let event = base_event();
        let mut venue = Venue::stub("place-1".into(), "The Venue".into());
        venue.city = Some("Warszawa".into());
        venue.set_rating_and_popularity(Some(4.9), Some(92.0)).unwrap();
        let text = compose(&event, None, "", "", Some(&venue));
        assert!(text.contains("extremely popular venue"));
        assert!(text.contains("top-rated venue in Warszawa"));
    }

    #[test]
    fn weekend_night_and_season_are_detected() {
        // 2026-07-25 is a Saturday, 21:00 -> night, July -> summer
        let event = base_event();
        let text = compose(&event, None, "", "", None);
        assert!(text.contains("weekend"));
        assert!(text.contains("night"));
        assert!(text.contains("summer"));
    }

    #[test]
    fn keeps_diacritic_letters_but_strips_other_symbols() {
        let cleaned = clean_text("Café @@ Rocks!! ");
        assert_eq!(cleaned, "Café Rocks!!");
    }
}
