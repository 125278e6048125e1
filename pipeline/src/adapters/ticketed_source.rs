use eventmesh_core::domain::NormalizedEventDocument;
use serde_json::Value;

use super::http_paged::PagedSource;

/// Concrete `PagedSource` for a Ticketmaster-shaped discovery API: an
/// offset/size JSON endpoint returning `_embedded.events[]`, each event
/// carrying its own venue, classification, and price range — grounded on
/// the field names the teacher's `ConorByrneCrawler` pulls out of its
/// GraphQL response, adapted to a plain paged REST shape.
pub struct TicketedDiscoveryFeed {
    name: &'static str,
    base_url: String,
    api_key: String,
}

impl TicketedDiscoveryFeed {
    pub fn new(name: &'static str, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn field_str(raw: &Value, path: &[&str]) -> Option<String> {
        let mut cur = raw;
        for key in path {
            cur = cur.get(key)?;
        }
        cur.as_str().map(str::to_string)
    }

    fn join_names(raw: &Value, collection_path: &str, name_key: &str) -> String {
        raw.get(collection_path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(name_key).and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    }
}

impl PagedSource for TicketedDiscoveryFeed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn page_url(&self, offset: usize, size: usize) -> String {
        format!(
            "{}/discovery/v2/events?apikey={}&page={}&size={}",
            self.base_url,
            self.api_key,
            offset / size.max(1),
            size
        )
    }

    fn extract_records(&self, page: &Value) -> Vec<Value> {
        page.get("_embedded")
            .and_then(|e| e.get("events"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn map(&self, raw: &Value) -> Option<NormalizedEventDocument> {
        let url = Self::field_str(raw, &["url"])?;
        let event_name = Self::field_str(raw, &["name"]).unwrap_or_default();
        if event_name.is_empty() {
            return None;
        }

        let start_date = raw
            .get("dates")
            .and_then(|d| d.get("start"))
            .and_then(|s| s.get("dateTime"))
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp().to_string())
            .unwrap_or_else(|| "null".to_string());

        let venue = raw
            .get("_embedded")
            .and_then(|e| e.get("venues"))
            .and_then(Value::as_array)
            .and_then(|v| v.first());

        let place = venue
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let location = venue
            .and_then(|v| v.get("city"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let category = raw
            .get("classifications")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("segment"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let artists = raw
            .get("_embedded")
            .map(|embedded| Self::join_names(embedded, "attractions", "name"))
            .unwrap_or_default();

        let thumbnail = raw
            .get("images")
            .and_then(Value::as_array)
            .and_then(|imgs| imgs.first())
            .and_then(|img| img.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(NormalizedEventDocument {
            event_name,
            start_date,
            end_date: "null".to_string(),
            thumbnail,
            url,
            location,
            place,
            category,
            tags: String::new(),
            artists,
            description: Self::field_str(raw, &["info"]).unwrap_or_default(),
            source: self.name.to_string(),
        })
    }
}
