//! SQL Generator
//!
//! Uses an LLM (Anthropic or OpenAI) to produce a candidate SQL query from a
//! schema, a question, and optional context carried over from enrichment or
//! from a failed previous attempt.

use std::sync::Arc;

use anyhow::Result;

use crate::client_factory::{create_llm_client, create_llm_client_with_key};
use crate::llm_client::LlmClient;

/// One generation call's inputs
///
/// `guidance` is the fix instruction derived from the previous iteration's
/// failed dry run; it is absent on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub schema: &'a str,
    pub question: &'a str,
    pub semantic_context: Option<&'a str>,
    pub guidance: Option<&'a str>,
}

/// Candidate-SQL generator backed by an LLM
pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
}

impl SqlGenerator {
    /// Create with a specific LLM client
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Create with an explicit API key for the configured backend
    pub fn with_api_key(api_key: String) -> Result<Self> {
        Ok(Self {
            client: create_llm_client_with_key(api_key)?,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client: create_llm_client()?,
        })
    }

    /// Generate one candidate query. The reply is stripped of markdown code
    /// fences before it is returned, so the caller always sees bare SQL.
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let system_prompt = include_str!("prompts/generator_system.md");
        let user_prompt = Self::build_user_prompt(request);

        tracing::debug!(
            model = self.client.model_name(),
            with_context = request.semantic_context.is_some(),
            with_guidance = request.guidance.is_some(),
            "generating candidate SQL"
        );

        let response = self.client.chat(system_prompt, &user_prompt).await?;
        Ok(strip_code_fences(&response))
    }

    fn build_user_prompt(request: &GenerationRequest<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Schema\n");
        prompt.push_str(request.schema);
        prompt.push_str("\n\n");

        if let Some(context) = request.semantic_context {
            prompt.push_str("## Business Context\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }

        prompt.push_str("## Question\n");
        prompt.push_str(request.question);
        prompt.push_str("\n\n");

        if let Some(guidance) = request.guidance {
            prompt.push_str("## Fix Guidance From Previous Attempt\n");
            prompt.push_str(guidance);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Generate the SQL query now.\n");
        prompt
    }
}

/// Strip a surrounding markdown code fence (``` or ```sql) from LLM output.
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if text.starts_with("```") {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() > 2 {
            // Drop the opening ```sql line and the closing ``` line
            let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[1..end].join("\n").trim().to_string();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_fence() {
        let fenced = "```sql\nSELECT term FROM `p.d.top_terms`\n```";
        assert_eq!(
            strip_code_fences(fenced),
            "SELECT term FROM `p.d.top_terms`"
        );
    }

    #[test]
    fn test_strip_plain_fence() {
        let fenced = "```\nSELECT 1\n```";
        assert_eq!(strip_code_fences(fenced), "SELECT 1");
    }

    #[test]
    fn test_bare_sql_unchanged() {
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_user_prompt_sections() {
        let request = GenerationRequest {
            schema: "{\"top_terms\": {}}",
            question: "top terms this week",
            semantic_context: Some("## Relevant Tables\n- top_terms"),
            guidance: Some("Use `week` instead of `date`."),
        };
        let prompt = SqlGenerator::build_user_prompt(&request);
        assert!(prompt.contains("## Schema"));
        assert!(prompt.contains("## Business Context"));
        assert!(prompt.contains("## Question"));
        assert!(prompt.contains("## Fix Guidance From Previous Attempt"));
        assert!(prompt.contains("Use `week` instead of `date`."));
    }

    #[test]
    fn test_user_prompt_omits_absent_sections() {
        let request = GenerationRequest {
            schema: "{}",
            question: "q",
            semantic_context: None,
            guidance: None,
        };
        let prompt = SqlGenerator::build_user_prompt(&request);
        assert!(!prompt.contains("## Business Context"));
        assert!(!prompt.contains("## Fix Guidance"));
    }
}
