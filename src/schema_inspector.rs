//! Schema inspection
//!
//! Consolidates per-table metadata from the toolbox into the single schema
//! document the generator prompts with: one JSON object keyed by table name.

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Access to table metadata for a dataset
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// List table names in the dataset
    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>>;

    /// Detailed schema for one table (columns, types, partitioning)
    async fn table_info(&self, dataset: &str, table: &str) -> Result<serde_json::Value>;
}

/// Builds the consolidated schema document for one dataset
pub struct SchemaInspector<'a> {
    catalog: &'a dyn TableCatalog,
    dataset: &'a str,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(catalog: &'a dyn TableCatalog, dataset: &'a str) -> Self {
        Self { catalog, dataset }
    }

    /// Inspect every table in the dataset, or only `tables` when the
    /// enrichment phase already narrowed the list down.
    pub async fn inspect(&self, tables: Option<&[String]>) -> Result<String> {
        let table_names = match tables {
            Some(filtered) if !filtered.is_empty() => filtered.to_vec(),
            _ => self
                .catalog
                .list_tables(self.dataset)
                .await
                .with_context(|| format!("listing tables in {}", self.dataset))?,
        };

        tracing::info!(dataset = self.dataset, tables = table_names.len(), "inspecting schema");

        let mut schema = serde_json::Map::new();
        for table in &table_names {
            let info = self
                .catalog
                .table_info(self.dataset, table)
                .await
                .with_context(|| format!("fetching table info for {}", table))?;
            schema.insert(table.clone(), info);
        }

        serde_json::to_string_pretty(&serde_json::Value::Object(schema))
            .context("serializing consolidated schema")
    }
}
