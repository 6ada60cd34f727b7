//! OpenAI Client
//!
//! LLM client implementation for the OpenAI chat completions API.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::llm_client::LlmClient;

const DEFAULT_MODEL: &str = "gpt-4o";
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    model: String,
}

impl OpenAiClient {
    /// Create a new client; the model comes from `OPENAI_MODEL` when set.
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
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

    /// Create from the `OPENAI_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    async fn call_api(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String> {
        tracing::debug!(model = %self.model, json_mode, "calling OpenAI API");

        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": 0.1
        });

        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("OpenAI returned no choices"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt, false).await
    }

    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}
