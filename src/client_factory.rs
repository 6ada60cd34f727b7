//! LLM client construction
//!
//! Builds the concrete [`LlmClient`] for the configured backend.

use std::sync::Arc;

use anyhow::Result;

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Create an LLM client for the backend selected by `AGENT_BACKEND`,
/// reading the provider API key from the environment.
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>> {
    let backend = AgentBackend::from_env()?;
    let client: Arc<dyn LlmClient> = match backend {
        AgentBackend::Anthropic => Arc::new(AnthropicClient::from_env()?),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::from_env()?),
    };
    tracing::info!(provider = client.provider_name(), model = client.model_name(),
        "LLM client ready");
    Ok(client)
}

/// Create an LLM client with an explicit API key for the selected backend.
pub fn create_llm_client_with_key(api_key: String) -> Result<Arc<dyn LlmClient>> {
    let backend = AgentBackend::from_env()?;
    Ok(match backend {
        AgentBackend::Anthropic => Arc::new(AnthropicClient::new(api_key)),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::new(api_key)),
    })
}
