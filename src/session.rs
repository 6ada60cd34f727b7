//! Per-request session state
//!
//! One `SessionState` is created per end-user question and handed by mutable
//! reference through the pipeline phases. The slots are a fixed, typed set
//! instead of an open-ended map, so a phase reading a slot that was never
//! written is a compile error rather than a runtime surprise. Slots are only
//! overwritten or left `None`, never removed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared state for one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Request correlation id, for logs
    pub request_id: Uuid,
    /// The user's natural-language question
    pub question: String,
    /// Consolidated schema document, written by schema inspection
    pub schema: Option<String>,
    /// Markdown business context, written by enrichment when enabled
    pub semantic_context: Option<String>,
    /// Tables the enricher considers relevant to the question
    pub filtered_table_list: Option<Vec<String>>,
    /// Most recent candidate from the convergence loop
    pub candidate_sql: Option<String>,
    /// Most recent guidance from the convergence loop
    pub guidance: Option<String>,
    /// Whether the loop ended with a valid candidate; `None` until it ran
    pub sql_is_valid: Option<bool>,
    /// The converged query. Set if and only if the loop ended `Converged`.
    pub valid_sql: Option<String>,
}

impl SessionState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            question: question.into(),
            schema: None,
            semantic_context: None,
            filtered_table_list: None,
            candidate_sql: None,
            guidance: None,
            sql_is_valid: None,
            valid_sql: None,
        }
    }
}
