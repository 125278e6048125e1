use std::time::Duration;

use async_trait::async_trait;
use eventmesh_core::domain::NormalizedEventDocument;
use serde_json::Value;
use tracing::{instrument, warn};

use super::SourceAdapter;
use crate::error::{PipelineError, Result};

/// One step of a browser action script: dismisses consent overlays,
/// clicks a load-more control until disabled or a cap is met, or
/// attaches a response listener to intercept an XHR endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate { url: String },
    DismissConsent { selector: String },
    ClickLoadMore { selector: String, max_clicks: usize },
    InterceptXhr { url_pattern: String },
}

/// Minimal client for a remote headless-browser automation service,
/// grounded on `browserless-client`'s `/content` POST shape — extended
/// with a `/function` call that runs an action script and returns every
/// intercepted response body as a JSON array.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build browserless http client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub async fn run_script(&self, actions: &[BrowserAction]) -> Result<Vec<Value>> {
        let mut endpoint = format!("{}/function", self.base_url);
        if let Some(token) = &self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let resp = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "actions": actions }))
            .send()
            .await
            .map_err(PipelineError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Transient(format!(
                "browserless returned {status}: {body}"
            )));
        }

        let captured: Vec<Value> = resp.json().await.map_err(PipelineError::Http)?;
        Ok(captured)
    }
}

/// Venue-specific half of a browser-driven adapter: where to navigate,
/// how to get past a consent overlay, how to page, and how to turn an
/// intercepted XHR body into documents.
#[async_trait]
pub trait BrowserSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn start_url(&self) -> String;
    fn consent_selector(&self) -> Option<&'static str>;
    fn load_more_selector(&self) -> Option<&'static str>;
    fn xhr_url_pattern(&self) -> &'static str;
    fn map_captured(&self, captured: &[Value]) -> Vec<NormalizedEventDocument>;
}

pub struct BrowserAdapter<T: BrowserSource> {
    source: T,
    client: BrowserlessClient,
    max_clicks: usize,
}

impl<T: BrowserSource> BrowserAdapter<T> {
    pub fn new(source: T, client: BrowserlessClient, max_clicks: usize) -> Self {
        Self {
            source,
            client,
            max_clicks,
        }
    }
}

#[async_trait]
impl<T: BrowserSource> SourceAdapter for BrowserAdapter<T> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    async fn fetch_and_map(&self, cap: usize) -> Result<Vec<NormalizedEventDocument>> {
        let mut actions = vec![BrowserAction::Navigate {
            url: self.source.start_url(),
        }];
        if let Some(selector) = self.source.consent_selector() {
            actions.push(BrowserAction::DismissConsent {
                selector: selector.to_string(),
            });
        }
        if let Some(selector) = self.source.load_more_selector() {
            actions.push(BrowserAction::ClickLoadMore {
                selector: selector.to_string(),
                max_clicks: self.max_clicks,
            });
        }
        actions.push(BrowserAction::InterceptXhr {
            url_pattern: self.source.xhr_url_pattern().to_string(),
        });

        let captured = match self.client.run_script(&actions).await {
            Ok(captured) => captured,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "browser script failed, returning partial results");
                Vec::new()
            }
        };

        let mut docs = self.source.map_captured(&captured);
        docs.truncate(cap);

        if docs.is_empty() {
            warn!(source = self.source.name(), "adapter returned zero records");
        }

        Ok(docs)
    }
}
