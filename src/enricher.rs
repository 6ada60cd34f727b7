//! Semantic enrichment
//!
//! Optional first phase: extract business terms from the question with the
//! LLM, search the metadata catalog for matching data assets, and consolidate
//! what comes back into a markdown context block plus a narrowed table list
//! for schema inspection.
//!
//! Enrichment is best-effort. A failing catalog call degrades to "no context"
//! with a warning rather than aborting the pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm_client::LlmClient;

/// One data asset returned by a catalog search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Catalog entry name, used for lookups
    pub name: String,
    /// Fully-qualified table name, when the entry maps to a table
    pub resource: Option<String>,
    pub description: Option<String>,
}

/// Metadata catalog search capability
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search_entries(&self, query: &str) -> Result<Vec<CatalogEntry>>;

    /// Full metadata for one entry: column descriptions under `columns`
    /// (objects with `name`/`description`), business rules under
    /// `business_rules` (strings)
    async fn lookup_entry(&self, name: &str) -> Result<serde_json::Value>;
}

/// What enrichment hands to the rest of the pipeline
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutput {
    /// Markdown context for the generator prompt
    pub semantic_context: Option<String>,
    /// Fully-qualified tables worth inspecting, most relevant first
    pub filtered_table_list: Option<Vec<String>>,
}

/// Term-extraction + catalog-search enricher
pub struct SemanticEnricher {
    client: Arc<dyn LlmClient>,
}

impl SemanticEnricher {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Run the full enrichment phase for one question.
    pub async fn enrich(
        &self,
        question: &str,
        catalog: &dyn CatalogSearch,
    ) -> Result<EnrichmentOutput> {
        let terms = self.extract_terms(question).await?;
        if terms.is_empty() {
            tracing::info!("no business terms extracted, skipping catalog search");
            return Ok(EnrichmentOutput::default());
        }
        tracing::info!(?terms, "searching catalog for extracted terms");

        // Search per term, dedupe entries by name, preserve first-seen order
        let mut seen = BTreeSet::new();
        let mut entries: Vec<CatalogEntry> = Vec::new();
        for term in &terms {
            match catalog.search_entries(term).await {
                Ok(found) => {
                    for entry in found {
                        if seen.insert(entry.name.clone()) {
                            entries.push(entry);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "catalog search failed, continuing");
                }
            }
        }

        if entries.is_empty() {
            return Ok(EnrichmentOutput::default());
        }

        let mut tables: Vec<String> = Vec::new();
        let mut column_notes: Vec<String> = Vec::new();
        let mut business_rules: Vec<String> = Vec::new();

        for entry in &entries {
            if let Some(resource) = &entry.resource {
                tables.push(resource.clone());
            }
            match catalog.lookup_entry(&entry.name).await {
                Ok(detail) => {
                    collect_columns(&detail, &mut column_notes);
                    collect_rules(&detail, &mut business_rules);
                }
                Err(e) => {
                    tracing::warn!(entry = %entry.name, error = %e, "catalog lookup failed, continuing");
                }
            }
        }

        let context = render_context(&entries, &column_notes, &business_rules);
        Ok(EnrichmentOutput {
            semantic_context: Some(context),
            filtered_table_list: if tables.is_empty() {
                None
            } else {
                Some(tables)
            },
        })
    }

    /// Ask the LLM for the question's key business terms.
    async fn extract_terms(&self, question: &str) -> Result<Vec<String>> {
        let system_prompt = include_str!("prompts/term_extraction_system.md");
        let user_prompt = format!("Extract the business terms from this question:\n\n{}", question);

        let response = self
            .client
            .chat_json(system_prompt, &user_prompt)
            .await
            .context("term extraction call failed")?;

        parse_terms(&response)
            .with_context(|| format!("term extraction returned unparseable JSON: {}", response))
    }
}

#[derive(Deserialize)]
struct TermList {
    terms: Vec<String>,
}

/// Accept either `{"terms": [...]}` or a bare JSON array.
fn parse_terms(response: &str) -> Result<Vec<String>> {
    let trimmed = response.trim();
    if let Ok(list) = serde_json::from_str::<TermList>(trimmed) {
        return Ok(list.terms);
    }
    let terms: Vec<String> = serde_json::from_str(trimmed)?;
    Ok(terms)
}

fn collect_columns(detail: &serde_json::Value, out: &mut Vec<String>) {
    if let Some(columns) = detail.get("columns").and_then(|c| c.as_array()) {
        for column in columns {
            let name = column.get("name").and_then(|n| n.as_str());
            let description = column.get("description").and_then(|d| d.as_str());
            if let (Some(name), Some(description)) = (name, description) {
                out.push(format!("`{}`: {}", name, description));
            }
        }
    }
}

fn collect_rules(detail: &serde_json::Value, out: &mut Vec<String>) {
    if let Some(rules) = detail.get("business_rules").and_then(|r| r.as_array()) {
        for rule in rules {
            if let Some(rule) = rule.as_str() {
                out.push(rule.to_string());
            }
        }
    }
}

fn render_context(
    entries: &[CatalogEntry],
    column_notes: &[String],
    business_rules: &[String],
) -> String {
    let mut md = String::from("## Relevant Tables\n");
    for entry in entries {
        let label = entry.resource.as_deref().unwrap_or(&entry.name);
        match &entry.description {
            Some(description) => md.push_str(&format!("- `{}`: {}\n", label, description)),
            None => md.push_str(&format!("- `{}`\n", label)),
        }
    }

    if !column_notes.is_empty() {
        md.push_str("\n## Column Descriptions\n");
        for note in column_notes {
            md.push_str(&format!("- {}\n", note));
        }
    }

    if !business_rules.is_empty() {
        md.push_str("\n## Business Rules\n");
        for rule in business_rules {
            md.push_str(&format!("- {}\n", rule));
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct OneShotLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for OneShotLlm {
        async fn chat(&self, _s: &str, _u: &str) -> Result<String> {
            Ok(self.response.clone())
        }
        async fn chat_json(&self, _s: &str, _u: &str) -> Result<String> {
            Ok(self.response.clone())
        }
        fn model_name(&self) -> &str {
            "one-shot"
        }
        fn provider_name(&self) -> &str {
            "test"
        }
    }

    struct FakeCatalog {
        fail_search: bool,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CatalogSearch for FakeCatalog {
        async fn search_entries(&self, _query: &str) -> Result<Vec<CatalogEntry>> {
            if self.fail_search {
                return Err(anyhow!("catalog unavailable"));
            }
            Ok(vec![CatalogEntry {
                name: "trends_top_terms".to_string(),
                resource: Some("bigquery-public-data.google_trends.top_terms".to_string()),
                description: Some("Daily top search terms".to_string()),
            }])
        }

        async fn lookup_entry(&self, name: &str) -> Result<serde_json::Value> {
            self.lookups.lock().unwrap().push(name.to_string());
            Ok(serde_json::json!({
                "columns": [
                    {"name": "dma_id", "description": "Designated market area identifier"}
                ],
                "business_rules": ["rank 1 is the most popular term"]
            }))
        }
    }

    #[tokio::test]
    async fn test_enrich_builds_context_and_table_list() {
        let enricher = SemanticEnricher::new(Arc::new(OneShotLlm {
            response: r#"{"terms": ["search trends"]}"#.to_string(),
        }));
        let catalog = FakeCatalog {
            fail_search: false,
            lookups: Mutex::new(Vec::new()),
        };

        let output = enricher
            .enrich("what are the top search trends?", &catalog)
            .await
            .unwrap();

        let context = output.semantic_context.unwrap();
        assert!(context.contains("## Relevant Tables"));
        assert!(context.contains("top_terms"));
        assert!(context.contains("## Column Descriptions"));
        assert!(context.contains("dma_id"));
        assert!(context.contains("## Business Rules"));
        assert_eq!(
            output.filtered_table_list.unwrap(),
            vec!["bigquery-public-data.google_trends.top_terms".to_string()]
        );
        assert_eq!(
            catalog.lookups.lock().unwrap().as_slice(),
            ["trends_top_terms".to_string()]
        );
    }

    #[tokio::test]
    async fn test_enrich_degrades_when_catalog_fails() {
        let enricher = SemanticEnricher::new(Arc::new(OneShotLlm {
            response: r#"["search trends"]"#.to_string(),
        }));
        let catalog = FakeCatalog {
            fail_search: true,
            lookups: Mutex::new(Vec::new()),
        };

        let output = enricher.enrich("question", &catalog).await.unwrap();
        assert!(output.semantic_context.is_none());
        assert!(output.filtered_table_list.is_none());
    }

    #[tokio::test]
    async fn test_no_terms_skips_search() {
        let enricher = SemanticEnricher::new(Arc::new(OneShotLlm {
            response: r#"{"terms": []}"#.to_string(),
        }));
        let catalog = FakeCatalog {
            fail_search: true,
            lookups: Mutex::new(Vec::new()),
        };

        let output = enricher.enrich("question", &catalog).await.unwrap();
        assert!(output.semantic_context.is_none());
    }

    #[test]
    fn test_parse_terms_accepts_both_shapes() {
        assert_eq!(
            parse_terms(r#"{"terms": ["a", "b"]}"#).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(parse_terms(r#"["a"]"#).unwrap(), vec!["a"]);
        assert!(parse_terms("not json").is_err());
    }
}
