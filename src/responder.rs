//! Final execution and response formatting
//!
//! Runs only after the convergence loop. On a converged query this executes
//! it for real and renders the rows; on exhaustion it produces the failure
//! explanation (apology, last candidate, guidance) without executing
//! anything.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm_client::LlmClient;

/// Real (non-dry-run) query execution capability
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute the query and return its rows as JSON objects
    async fn execute(&self, query: &str) -> Result<Vec<serde_json::Value>>;
}

/// Formats executed results for the user
pub struct FinalResponder {
    client: Arc<dyn LlmClient>,
}

impl FinalResponder {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Render an answer from executed rows. Falls back to a plain tabular
    /// rendering if the LLM summary call fails; the rows were already paid
    /// for at that point.
    pub async fn respond(
        &self,
        question: &str,
        query: &str,
        rows: &[serde_json::Value],
    ) -> String {
        let system_prompt = include_str!("prompts/responder_system.md");
        let rows_json = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
        let user_prompt = format!(
            "Question: {}\n\nExecuted SQL:\n{}\n\nRows ({}):\n{}",
            question,
            query,
            rows.len(),
            rows_json
        );

        match self.client.chat(system_prompt, &user_prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "responder LLM call failed, using plain rendering");
                render_rows(rows)
            }
        }
    }
}

/// Plain-text rendering of result rows, one line per row.
pub fn render_rows(rows: &[serde_json::Value]) -> String {
    if rows.is_empty() {
        return "The query returned no rows.".to_string();
    }

    let mut out = format!("{} row(s):\n", rows.len());
    for row in rows {
        match row.as_object() {
            Some(fields) => {
                let line: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                out.push_str(&line.join("  "));
            }
            None => out.push_str(&row.to_string()),
        }
        out.push('\n');
    }
    out
}

/// The user-facing explanation when the loop exhausted its budget. The last
/// candidate and guidance are surfaced verbatim; no query is executed.
pub fn exhaustion_report(last_candidate: Option<&str>, guidance: Option<&str>) -> String {
    let mut out = String::from(
        "Sorry, I could not produce a valid SQL query for this question within the attempt budget.\n",
    );
    if let Some(candidate) = last_candidate {
        out.push_str("\nLast attempted query:\n");
        out.push_str(candidate);
        out.push('\n');
    }
    if let Some(guidance) = guidance {
        out.push_str("\nRemaining issue: ");
        out.push_str(guidance);
        out.push('\n');
    }
    out
}
