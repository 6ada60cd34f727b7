//! Anthropic Client
//!
//! LLM client implementation for the Anthropic Claude API.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::llm_client::LlmClient;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic Claude API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    http: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    /// Create a new client; the model comes from `ANTHROPIC_MODEL` when set.
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(api_key, &model)
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    async fn call_api(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, "calling Anthropic API");

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 4096,
                "system": system_prompt,
                "messages": [{"role": "user", "content": user_prompt}]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| anyhow!("Empty response from Anthropic"))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt).await
    }

    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        // No json_object mode on this API, rely on prompt engineering
        let json_system = format!(
            "{}\n\nIMPORTANT: Respond with valid JSON only. No markdown code blocks, no explanations.",
            system_prompt
        );
        self.call_api(&json_system, user_prompt).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}
