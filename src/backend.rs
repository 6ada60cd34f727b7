//! LLM provider selection
//!
//! The pipeline talks to one provider per process, chosen from the
//! `AGENT_BACKEND` environment variable at construction time.

use anyhow::{bail, Result};

/// Which LLM provider backs the generator and enricher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    /// Anthropic Claude (default)
    #[default]
    Anthropic,
    /// OpenAI GPT
    OpenAi,
}

impl AgentBackend {
    /// Resolve from the `AGENT_BACKEND` environment variable.
    ///
    /// Accepts "anthropic"/"claude" and "openai"/"gpt"; unset means Anthropic.
    pub fn from_env() -> Result<Self> {
        match std::env::var("AGENT_BACKEND") {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(AgentBackend::Anthropic),
        }
    }

    /// Parse a backend name, case-insensitive.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            other => bail!(
                "unknown AGENT_BACKEND '{}' (valid: anthropic, claude, openai, gpt)",
                other
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
