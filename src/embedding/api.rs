//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::embedding::EmbeddingService;
use crate::Ah32Error;

/// Configuration for the embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier (required, no default)
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct ApiEmbeddingService {
    config: EmbeddingConfig,
    client: Client,
}

impl ApiEmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self, Ah32Error> {
        if config.model.trim().is_empty() {
            return Err(Ah32Error::Config("EMBEDDING_MODEL must not be empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Ah32Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EmbeddingService for ApiEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Ah32Error> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| Ah32Error::Llm("Embedding response was empty".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Ah32Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        debug!(model = %self.config.model, count = texts.len(), "Requesting embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({"model": self.config.model, "input": texts}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Embedding request failed");
            return Err(Ah32Error::Llm(format!(
                "Embedding provider returned {}: {}",
                status,
                crate::utils::text::truncate_chars(&body, 300)
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(Ah32Error::Llm(format!(
                "Embedding provider returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            model: model.into(),
            api_base: "http://localhost:9/v1".into(),
            api_key: "k".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_empty_model_rejected() {
        assert!(matches!(
            ApiEmbeddingService::new(config("  ")),
            Err(Ah32Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let svc = ApiEmbeddingService::new(config("bge-m3")).unwrap();
        assert!(svc.embed_batch(&[]).await.unwrap().is_empty());
        assert_eq!(svc.model_name(), "bge-m3");
    }
}
