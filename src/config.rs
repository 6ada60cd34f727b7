//! Agent configuration
//!
//! Resolved once at pipeline construction. Runtime behavior that used to be
//! toggled mid-flight (enrichment on/off, iteration budget) is fixed here so
//! the phases themselves stay branch-free.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_TOOLBOX_HOST: &str = "127.0.0.1";
const DEFAULT_TOOLBOX_PORT: u16 = 5000;
const DEFAULT_MAX_ITERATIONS: usize = 3;
const DEFAULT_DATASET: &str = "bigquery-public-data.google_trends";

/// Configuration for one [`crate::pipeline::SqlAgentPipeline`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration budget for the convergence loop, at least 1
    pub max_iterations: usize,
    /// Run the semantic enrichment phase before schema inspection
    pub enrichment_enabled: bool,
    /// Base URL of the MCP toolbox service (schema, dry-run, execution, catalog)
    pub toolbox_url: String,
    /// Fully-qualified dataset the agent answers questions about
    pub dataset: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            enrichment_enabled: false,
            toolbox_url: format!(
                "http://{}:{}/mcp",
                DEFAULT_TOOLBOX_HOST, DEFAULT_TOOLBOX_PORT
            ),
            dataset: DEFAULT_DATASET.to_string(),
        }
    }
}

impl AgentConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// - `TOOLBOX_HOST` / `TOOLBOX_PORT`: toolbox endpoint
    /// - `DATAPLEX_ENABLED`: "true"/"1" turns the enrichment phase on
    /// - `SQL_AGENT_MAX_ITERATIONS`: convergence loop budget
    /// - `SQL_AGENT_DATASET`: target dataset
    pub fn from_env() -> Result<Self> {
        let host =
            std::env::var("TOOLBOX_HOST").unwrap_or_else(|_| DEFAULT_TOOLBOX_HOST.to_string());
        let port = match std::env::var("TOOLBOX_PORT") {
            Ok(p) => match p.parse::<u16>() {
                Ok(p) => p,
                Err(_) => bail!("TOOLBOX_PORT '{}' is not a valid port number", p),
            },
            Err(_) => DEFAULT_TOOLBOX_PORT,
        };

        let enrichment_enabled = std::env::var("DATAPLEX_ENABLED")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let max_iterations = match std::env::var("SQL_AGENT_MAX_ITERATIONS") {
            Ok(n) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => bail!("SQL_AGENT_MAX_ITERATIONS '{}' must be an integer >= 1", n),
            },
            Err(_) => DEFAULT_MAX_ITERATIONS,
        };

        let dataset =
            std::env::var("SQL_AGENT_DATASET").unwrap_or_else(|_| DEFAULT_DATASET.to_string());

        Ok(Self {
            max_iterations,
            enrichment_enabled,
            toolbox_url: format!("http://{}:{}/mcp", host, port),
            dataset,
        })
    }

    /// Set the iteration budget, clamping to the minimum of one full cycle.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    pub fn with_enrichment(mut self, enabled: bool) -> Self {
        self.enrichment_enabled = enabled;
        self
    }
}
