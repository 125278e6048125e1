use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatchResult {
    pub vectors: Vec<Vec<f32>>,
    pub tokens_used: Option<u64>,
}

/// Contract with the remote embedding provider: `{model, input,
/// dimensions} -> {data: [{index, embedding}], usage}`, bearer-token auth.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatchResult>;
}

pub struct ReqwestEmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
    endpoint: String,
}

impl ReqwestEmbeddingClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingUsage {
    total_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    usage: Option<EmbeddingUsage>,
}

#[async_trait]
impl EmbeddingClient for ReqwestEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatchResult> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": texts,
                "dimensions": self.dimensions,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                Err(PipelineError::Transient(format!("embedding provider {status}: {body}")))
            } else {
                Err(PipelineError::Permanent(format!("embedding provider {status}: {body}")))
            };
        }

        let mut parsed: EmbeddingResponse = resp.json().await?;
        parsed.data.sort_by_key(|d| d.index);

        for vector in &parsed.data {
            if vector.embedding.len() != self.dimensions {
                return Err(PipelineError::Permanent(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    vector.embedding.len()
                )));
            }
        }

        Ok(EmbeddingBatchResult {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
        })
    }
}
