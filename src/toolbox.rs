//! MCP toolbox client
//!
//! Single HTTP client for the toolbox service the agent delegates all
//! engine-facing work to: `execute_sql` (with a dry-run flag), table listing
//! and metadata, and the catalog search used by enrichment. Calls go over the
//! MCP `tools/call` JSON-RPC surface.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::enricher::{CatalogEntry, CatalogSearch};
use crate::responder::QueryExecutor;
use crate::schema_inspector::TableCatalog;
use crate::validator::{QueryValidator, ValidationOutcome};

/// Client for the MCP toolbox endpoint
pub struct ToolboxClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

/// One tool call's outcome: the text payload plus whether the tool flagged it
/// as an error
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub is_error: bool,
    pub text: String,
}

impl ToolboxClient {
    /// `url` is the full MCP endpoint, e.g. `http://127.0.0.1:5000/mcp`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call_tool(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tool, id, "toolbox call");

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": {"name": tool, "arguments": arguments}
            }))
            .send()
            .await
            .with_context(|| format!("toolbox call '{}' failed to send", tool))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("toolbox HTTP error {} for '{}': {}", status, tool, body);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("toolbox call '{}' returned non-JSON body", tool))?;
        parse_tool_response(&body).with_context(|| format!("toolbox call '{}'", tool))
    }

    /// Run SQL through the engine. `dry_run = true` validates without
    /// executing; the convergence loop only ever uses that mode.
    pub async fn execute_sql(&self, sql: &str, dry_run: bool) -> Result<ToolResponse> {
        self.call_tool(
            "execute_sql",
            serde_json::json!({"sql": sql, "dry_run": dry_run}),
        )
        .await
    }
}

/// Extract the text content from a JSON-RPC `tools/call` response body.
fn parse_tool_response(body: &serde_json::Value) -> Result<ToolResponse> {
    if let Some(error) = body.get("error") {
        bail!("JSON-RPC error: {}", error);
    }

    let result = body
        .get("result")
        .ok_or_else(|| anyhow!("response has neither result nor error"))?;

    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    Ok(ToolResponse { is_error, text })
}

#[async_trait]
impl QueryValidator for ToolboxClient {
    async fn validate(&self, query: &str, mutating: bool) -> Result<ValidationOutcome> {
        let response = self.execute_sql(query, !mutating).await?;
        if response.is_error {
            Ok(ValidationOutcome::invalid(response.text))
        } else {
            Ok(ValidationOutcome::Valid)
        }
    }
}

#[async_trait]
impl QueryExecutor for ToolboxClient {
    async fn execute(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        let response = self.execute_sql(query, false).await?;
        if response.is_error {
            bail!("execution failed: {}", response.text);
        }
        Ok(rows_from_text(&response.text))
    }
}

/// Tool output is the row set serialized as JSON; tolerate a bare object or
/// plain text for engines that answer with a scalar.
fn rows_from_text(text: &str) -> Vec<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(rows)) => rows,
        Ok(other) => vec![other],
        Err(_) => vec![serde_json::json!({"result": text})],
    }
}

#[async_trait]
impl TableCatalog for ToolboxClient {
    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        let response = self
            .call_tool("list_tables", serde_json::json!({"dataset": dataset}))
            .await?;
        if response.is_error {
            bail!("list_tables failed: {}", response.text);
        }
        serde_json::from_str(&response.text)
            .with_context(|| format!("list_tables returned unexpected payload: {}", response.text))
    }

    async fn table_info(&self, dataset: &str, table: &str) -> Result<serde_json::Value> {
        let response = self
            .call_tool(
                "get_table_info",
                serde_json::json!({"dataset": dataset, "table": table}),
            )
            .await?;
        if response.is_error {
            bail!("get_table_info failed for {}: {}", table, response.text);
        }
        Ok(serde_json::from_str(&response.text)
            .unwrap_or(serde_json::Value::String(response.text)))
    }
}

#[derive(Deserialize)]
struct SearchHit {
    name: String,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl CatalogSearch for ToolboxClient {
    async fn search_entries(&self, query: &str) -> Result<Vec<CatalogEntry>> {
        let response = self
            .call_tool("search_entries", serde_json::json!({"query": query}))
            .await?;
        if response.is_error {
            bail!("search_entries failed: {}", response.text);
        }
        let hits: Vec<SearchHit> = serde_json::from_str(&response.text)
            .with_context(|| format!("search_entries returned unexpected payload: {}", response.text))?;
        Ok(hits
            .into_iter()
            .map(|h| CatalogEntry {
                name: h.name,
                resource: h.resource,
                description: h.description,
            })
            .collect())
    }

    async fn lookup_entry(&self, name: &str) -> Result<serde_json::Value> {
        let response = self
            .call_tool("lookup_entry", serde_json::json!({"name": name}))
            .await?;
        if response.is_error {
            bail!("lookup_entry failed for {}: {}", name, response.text);
        }
        serde_json::from_str(&response.text)
            .with_context(|| format!("lookup_entry returned unexpected payload: {}", response.text))
    }
}
