mod enricher;
mod places_client;
mod popularity;

pub use enricher::{VenueEnricher, VenueState};
pub use places_client::{PlaceDetails, PlaceSearchResult, PlacesClient, ReqwestPlacesClient};
pub use popularity::{compute_popularity, popularity_band, venue_city_phrase};
