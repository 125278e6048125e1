use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceSearchResult {
    pub place_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlaceDetails {
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<i64>,
    pub price_level: Option<i32>,
    pub types: Vec<String>,
    pub photo_ref: Option<String>,
    pub review_count: Option<i64>,
}

/// Contract with the remote places provider. Text search and detail
/// lookup are two calls, both rate-limited/retried/circuit-broken at
/// the call boundary, never inside this trait.
#[async_trait]
pub trait PlacesClient: Send + Sync {
    async fn text_search(&self, place_name: &str, location_hint: &str) -> Result<Option<PlaceSearchResult>>;

    async fn details(&self, place_id: &str) -> Result<PlaceDetails>;
}

/// `reqwest`-backed implementation against the Places text-search and
/// details endpoints: query-parameter auth, `OK`/`ZERO_RESULTS` both
/// treated as acceptable statuses.
pub struct ReqwestPlacesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ReqwestPlacesClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
        }
    }

    fn classify_http_error(status: reqwest::StatusCode, body: &str) -> PipelineError {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            PipelineError::Transient(format!("places provider {status}: {body}"))
        } else {
            PipelineError::Permanent(format!("places provider {status}: {body}"))
        }
    }
}

#[async_trait]
impl PlacesClient for ReqwestPlacesClient {
    async fn text_search(&self, place_name: &str, location_hint: &str) -> Result<Option<PlaceSearchResult>> {
        let query = format!("{place_name} {location_hint}");
        let url = format!("{}/textsearch/json", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("query", query.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_http_error(status, &body));
        }

        let body: Value = resp.json().await?;
        let api_status = body.get("status").and_then(Value::as_str).unwrap_or("");
        match api_status {
            "OK" => {
                let first = body
                    .get("results")
                    .and_then(Value::as_array)
                    .and_then(|r| r.first())
                    .ok_or_else(|| PipelineError::Permanent("places OK status with no results".into()))?;
                let place_id = first
                    .get("place_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PipelineError::Permanent("places result missing place_id".into()))?
                    .to_string();
                let name = first.get("name").and_then(Value::as_str).unwrap_or(place_name).to_string();
                Ok(Some(PlaceSearchResult { place_id, name }))
            }
            "ZERO_RESULTS" => Ok(None),
            other => Err(PipelineError::Permanent(format!("places search status {other}"))),
        }
    }

    async fn details(&self, place_id: &str) -> Result<PlaceDetails> {
        let fields = "name,formatted_address,geometry,address_component,international_phone_number,\
                      website,rating,user_ratings_total,price_level,type,photo";
        let url = format!("{}/details/json", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("place_id", place_id), ("fields", fields), ("key", self.api_key.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_http_error(status, &body));
        }

        let body: Value = resp.json().await?;
        let api_status = body.get("status").and_then(Value::as_str).unwrap_or("");
        if api_status != "OK" {
            return Err(PipelineError::Permanent(format!("places details status {api_status}")));
        }

        let result = body.get("result").cloned().unwrap_or(Value::Null);
        Ok(parse_details(&result))
    }
}

fn parse_details(result: &Value) -> PlaceDetails {
    let geometry = result.get("geometry").and_then(|g| g.get("location"));
    let components = result
        .get("address_components")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let component_of = |kind: &str| -> Option<String> {
        components
            .iter()
            .find(|c| {
                c.get("types")
                    .and_then(Value::as_array)
                    .map(|types| types.iter().any(|t| t.as_str() == Some(kind)))
                    .unwrap_or(false)
            })
            .and_then(|c| c.get("long_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    PlaceDetails {
        name: result.get("name").and_then(Value::as_str).map(str::to_string),
        formatted_address: result.get("formatted_address").and_then(Value::as_str).map(str::to_string),
        latitude: geometry.and_then(|g| g.get("lat")).and_then(Value::as_f64),
        longitude: geometry.and_then(|g| g.get("lng")).and_then(Value::as_f64),
        city: component_of("locality"),
        street: component_of("route"),
        neighborhood: component_of("neighborhood"),
        postal_code: component_of("postal_code"),
        country: component_of("country"),
        phone: result
            .get("international_phone_number")
            .and_then(Value::as_str)
            .map(str::to_string),
        website: result.get("website").and_then(Value::as_str).map(str::to_string),
        rating: result.get("rating").and_then(Value::as_f64),
        user_ratings_total: result.get("user_ratings_total").and_then(Value::as_i64),
        price_level: result.get("price_level").and_then(Value::as_i64).map(|v| v as i32),
        types: result
            .get("types")
            .and_then(Value::as_array)
            .map(|types| types.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        photo_ref: result
            .get("photos")
            .and_then(Value::as_array)
            .and_then(|p| p.first())
            .and_then(|p| p.get("photo_reference"))
            .and_then(Value::as_str)
            .map(str::to_string),
        review_count: result
            .get("reviews")
            .and_then(Value::as_array)
            .map(|r| r.len() as i64),
    }
}
