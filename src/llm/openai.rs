//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::llm::{Completion, CompletionRequest, LlmClient, ModelTier, Usage};
use crate::Ah32Error;

/// Connection settings for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub fast_model: String,
    pub timeout: Duration,
}

pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, Ah32Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Ah32Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

/// Pull content, reasoning and usage out of a completion response body.
pub(crate) fn parse_completion(body: &Value) -> Result<Completion, Ah32Error> {
    let message = &body["choices"][0]["message"];
    let content = message["content"]
        .as_str()
        .ok_or_else(|| Ah32Error::Llm("Invalid response format: missing choices[0].message.content".into()))?
        .to_string();
    let reasoning = message["reasoning_content"]
        .as_str()
        .or_else(|| message["reasoning"].as_str())
        .filter(|r| !r.trim().is_empty())
        .map(str::to_string);
    let usage = serde_json::from_value::<Usage>(body["usage"].clone()).unwrap_or_default();
    Ok(Completion {
        content,
        reasoning,
        usage,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip(self, request), fields(tier = ?request.tier, messages = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, Ah32Error> {
        let model = self.model_name(request.tier);
        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            body["max_tokens"] = json!(m);
        }

        let prompt_chars: usize = request.messages.iter().map(|m| m.content.chars().count()).sum();
        debug!(model = %model, prompt_chars, "Sending chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Ah32Error::Llm(format!(
                "Provider returned {}: {}",
                status,
                crate::utils::text::truncate_chars(&error_text, 500)
            )));
        }

        let response_json: Value = response.json().await?;
        parse_completion(&response_json)
    }

    fn model_name(&self, tier: ModelTier) -> String {
        match tier {
            ModelTier::Default => self.config.model.clone(),
            ModelTier::Fast => self.config.fast_model.clone(),
        }
    }
}
