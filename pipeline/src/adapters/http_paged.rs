use async_trait::async_trait;
use eventmesh_core::domain::NormalizedEventDocument;
use reqwest::Client;
use serde_json::Value;
use tracing::{instrument, warn};

use super::SourceAdapter;
use crate::error::Result;

/// Source-specific half of a `HttpPagedAdapter`, mirroring the
/// teacher's `VenueParser` / `BaseCrawler` split (`apis/base.rs`) — the
/// generic pager owns paging and HTTP, the `PagedSource` owns the URL
/// shape and the raw->document mapping.
#[async_trait]
pub trait PagedSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Offset/size page URL for this source.
    fn page_url(&self, offset: usize, size: usize) -> String;

    /// Pull the page's records out of the decoded JSON body. An empty
    /// vec signals the pager to stop.
    fn extract_records(&self, page: &Value) -> Vec<Value>;

    /// Pure, deterministic raw->normalized mapping.
    fn map(&self, raw: &Value) -> Option<NormalizedEventDocument>;

    fn page_size(&self) -> usize {
        50
    }
}

/// Generic linear offset/size pager over a JSON endpoint, stopping on
/// an empty page, `cap`, or a fatal HTTP error — in the latter case
/// returning whatever was accumulated so far rather than failing the
/// whole fetch.
pub struct HttpPagedAdapter<T: PagedSource> {
    source: T,
    client: Client,
}

impl<T: PagedSource> HttpPagedAdapter<T> {
    pub fn new(source: T, client: Client) -> Self {
        Self { source, client }
    }
}

#[async_trait]
impl<T: PagedSource> SourceAdapter for HttpPagedAdapter<T> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    async fn fetch_and_map(&self, cap: usize) -> Result<Vec<NormalizedEventDocument>> {
        let page_size = self.source.page_size();
        let mut offset = 0usize;
        let mut docs = Vec::new();

        loop {
            if docs.len() >= cap {
                break;
            }
            let url = self.source.page_url(offset, page_size);
            let page: Value = match self.client.get(&url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.json().await {
                        Ok(body) => body,
                        Err(e) => {
                            warn!(source = self.source.name(), error = %e, "malformed page body, stopping with partial results");
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(source = self.source.name(), error = %e, "page request failed, stopping with partial results");
                        break;
                    }
                },
                Err(e) => {
                    warn!(source = self.source.name(), error = %e, "page request failed, stopping with partial results");
                    break;
                }
            };

            let records = self.source.extract_records(&page);
            if records.is_empty() {
                break;
            }

            for raw in &records {
                if let Some(doc) = self.source.map(raw) {
                    docs.push(doc);
                }
                if docs.len() >= cap {
                    break;
                }
            }

            offset += page_size;
        }

        if docs.is_empty() {
            warn!(source = self.source.name(), "adapter returned zero records");
        }

        Ok(docs)
    }
}
