/// Bayesian-adjusted popularity score in `[0, 100]`: normalize rating to
/// `[0,1]`, weight it by a confidence term derived from rating volume,
/// blend with a fixed prior, then blend again with the confidence
/// itself as a "quantity" signal. `score = 0` whenever `rating` is null.
pub fn compute_popularity(rating: Option<f64>, total_ratings: i64) -> f64 {
    let Some(rating) = rating else {
        return 0.0;
    };

    let normalized = (rating / 5.0).clamp(0.0, 1.0);
    let confidence = (((1.0 + total_ratings as f64).ln()) / ((1.0 + 500.0_f64).ln())).min(1.0);
    let bayes = normalized * confidence + (4.0 / 5.0) * (1.0 - confidence);
    let quantity = confidence;
    ((0.7 * bayes + 0.3 * quantity) * 100.0).clamp(0.0, 100.0)
}

/// Bucketed popularity phrase for embedding text.
pub fn popularity_band(score: f64) -> &'static str {
    if score >= 90.0 {
        "extremely popular"
    } else if score >= 80.0 {
        "highly popular"
    } else if score >= 70.0 {
        "very popular"
    } else if score >= 50.0 {
        "popular"
    } else {
        "moderately popular"
    }
}

/// City-qualified venue phrase.
pub fn venue_city_phrase(score: f64, city: &str) -> String {
    if score >= 85.0 {
        format!("top-rated venue in {city}")
    } else if score >= 70.0 {
        format!("well-known venue in {city}")
    } else {
        format!("venue in {city}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_rating_yields_zero_score() {
        assert_eq!(compute_popularity(None, 500), 0.0);
    }

    #[test]
    fn high_rating_with_large_volume_lands_in_the_upper_band() {
        let score = compute_popularity(Some(4.6), 1200);
        assert!((80.0..=95.0).contains(&score), "score was {score}");
    }

    #[test]
    fn monotone_in_rating_for_fixed_volume() {
        let low = compute_popularity(Some(3.0), 200);
        let high = compute_popularity(Some(4.9), 200);
        assert!(high >= low);
    }

    #[test]
    fn monotone_in_volume_for_rating_above_four_fifths() {
        let few = compute_popularity(Some(4.5), 10);
        let many = compute_popularity(Some(4.5), 5000);
        assert!(many >= few);
    }

    #[test]
    fn high_score_produces_extremely_popular_band_and_top_rated_phrase() {
        let score = 92.0;
        assert_eq!(popularity_band(score), "extremely popular");
        assert_eq!(venue_city_phrase(score, "Warszawa"), "top-rated venue in Warszawa");
    }
}
