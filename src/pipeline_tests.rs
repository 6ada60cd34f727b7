//! Pipeline integration tests
//!
//! End-to-end behavior from question to answer with every external
//! capability scripted: phase ordering, session-state projection, and the
//! converged vs exhausted execution paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::AgentConfig;
use crate::enricher::{CatalogEntry, CatalogSearch};
use crate::error::AgentError;
use crate::llm_client::LlmClient;
use crate::pipeline::{PipelineBuilder, PipelineOutcome};
use crate::responder::QueryExecutor;
use crate::schema_inspector::TableCatalog;
use crate::validator::{QueryValidator, ValidationOutcome};

/// LLM stub that answers generation calls from a script and records every
/// generation user prompt. Term extraction and final-response calls are
/// answered with fixed payloads.
struct StubLlm {
    sql_script: Mutex<Vec<String>>,
    generation_prompts: Mutex<Vec<String>>,
    generate_calls: AtomicUsize,
}

impl StubLlm {
    fn new(sql_script: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sql_script: Mutex::new(sql_script.iter().map(|s| s.to_string()).collect()),
            generation_prompts: Mutex::new(Vec::new()),
            generate_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        if system.contains("Final Responder") {
            return Ok("Here are your results.".to_string());
        }
        // Generation call
        self.generation_prompts.lock().unwrap().push(user.to_string());
        let idx = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.sql_script.lock().unwrap();
        script
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("generation script exhausted at call {}", idx + 1))
    }

    async fn chat_json(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(r#"{"terms": ["search trends"]}"#.to_string())
    }

    fn model_name(&self) -> &str {
        "stub"
    }
    fn provider_name(&self) -> &str {
        "test"
    }
}

struct StubValidator {
    outcomes: Mutex<Vec<ValidationOutcome>>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl StubValidator {
    fn new(outcomes: Vec<ValidationOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl QueryValidator for StubValidator {
    async fn validate(&self, query: &str, mutating: bool) -> Result<ValidationOutcome> {
        self.seen.lock().unwrap().push((query.to_string(), mutating));
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Err(anyhow!("validator script exhausted"));
        }
        Ok(outcomes.remove(0))
    }
}

struct StubExecutor {
    executed: Mutex<Vec<String>>,
}

impl StubExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            executed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl QueryExecutor for StubExecutor {
    async fn execute(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        self.executed.lock().unwrap().push(query.to_string());
        Ok(vec![serde_json::json!({"term": "weather", "rank": 1})])
    }
}

struct StubCatalog {
    fail: bool,
    inspected: Mutex<Vec<String>>,
}

impl StubCatalog {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            inspected: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            inspected: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TableCatalog for StubCatalog {
    async fn list_tables(&self, _dataset: &str) -> Result<Vec<String>> {
        if self.fail {
            return Err(anyhow!("toolbox unreachable"));
        }
        Ok(vec!["top_terms".to_string()])
    }

    async fn table_info(&self, _dataset: &str, table: &str) -> Result<serde_json::Value> {
        if self.fail {
            return Err(anyhow!("toolbox unreachable"));
        }
        self.inspected.lock().unwrap().push(table.to_string());
        Ok(serde_json::json!({"columns": [{"name": "term", "type": "STRING"}]}))
    }
}

struct StubSearch;

#[async_trait]
impl CatalogSearch for StubSearch {
    async fn search_entries(&self, _query: &str) -> Result<Vec<CatalogEntry>> {
        Ok(vec![CatalogEntry {
            name: "trends_entry".to_string(),
            resource: Some("top_rising_terms".to_string()),
            description: Some("Rising search terms".to_string()),
        }])
    }

    async fn lookup_entry(&self, _name: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "columns": [{"name": "percent_gain", "description": "Growth vs prior period"}],
            "business_rules": []
        }))
    }
}

fn config(max_iterations: usize, enrichment: bool) -> AgentConfig {
    AgentConfig::default()
        .with_max_iterations(max_iterations)
        .with_enrichment(enrichment)
}

#[tokio::test]
async fn test_converged_run_executes_final_query() {
    let llm = StubLlm::new(&["SELECT bad", "SELECT term FROM `t`"]);
    let validator = StubValidator::new(vec![
        ValidationOutcome::invalid("Unrecognized column"),
        ValidationOutcome::Valid,
    ]);
    let executor = StubExecutor::new();

    let pipeline = PipelineBuilder::new(config(3, false))
        .llm_client(llm.clone())
        .validator(validator.clone())
        .executor(executor.clone())
        .table_catalog(StubCatalog::new())
        .build()
        .unwrap();

    let report = pipeline.run("top terms?").await.unwrap();

    match &report.outcome {
        PipelineOutcome::Answered { query, rows, answer } => {
            assert_eq!(query, "SELECT term FROM `t`");
            assert_eq!(rows.len(), 1);
            assert_eq!(answer, "Here are your results.");
        }
        other => panic!("expected Answered, got {:?}", other),
    }

    // Exactly the converged query was executed, once
    assert_eq!(
        executor.executed.lock().unwrap().as_slice(),
        ["SELECT term FROM `t`".to_string()]
    );
    assert_eq!(report.attempts.len(), 2);

    // Session projection invariant: valid_sql set iff converged
    assert_eq!(report.session.sql_is_valid, Some(true));
    assert_eq!(report.session.valid_sql.as_deref(), Some("SELECT term FROM `t`"));
    assert_eq!(report.session.candidate_sql.as_deref(), Some("SELECT term FROM `t`"));
}

#[tokio::test]
async fn test_exhausted_run_executes_nothing() {
    let llm = StubLlm::new(&["SELECT a", "SELECT b"]);
    let validator = StubValidator::new(vec![
        ValidationOutcome::invalid("bad column a"),
        ValidationOutcome::invalid("bad column b"),
    ]);
    let executor = StubExecutor::new();

    let pipeline = PipelineBuilder::new(config(2, false))
        .llm_client(llm)
        .validator(validator)
        .executor(executor.clone())
        .table_catalog(StubCatalog::new())
        .build()
        .unwrap();

    let report = pipeline.run("top terms?").await.unwrap();

    match &report.outcome {
        PipelineOutcome::NotAnswered {
            last_candidate,
            guidance,
            explanation,
        } => {
            assert_eq!(last_candidate.as_deref(), Some("SELECT b"));
            assert_eq!(
                guidance.as_deref(),
                Some("Fix the previous query: bad column b")
            );
            assert!(explanation.contains("Sorry"));
            assert!(explanation.contains("SELECT b"));
        }
        other => panic!("expected NotAnswered, got {:?}", other),
    }

    assert!(executor.executed.lock().unwrap().is_empty());
    assert_eq!(report.session.sql_is_valid, Some(false));
    assert!(report.session.valid_sql.is_none());
}

#[tokio::test]
async fn test_guidance_from_attempt_flows_into_next_prompt() {
    let llm = StubLlm::new(&["SELECT a", "SELECT b"]);
    let validator = StubValidator::new(vec![
        ValidationOutcome::invalid("use column `week`, not `date`"),
        ValidationOutcome::Valid,
    ]);

    let pipeline = PipelineBuilder::new(config(3, false))
        .llm_client(llm.clone())
        .validator(validator)
        .executor(StubExecutor::new())
        .table_catalog(StubCatalog::new())
        .build()
        .unwrap();

    let report = pipeline.run("top terms per week?").await.unwrap();

    let prompts = llm.generation_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Fix Guidance"));
    // The second prompt carries exactly the guidance recorded on attempt 1
    let recorded = report.attempts[0].guidance.as_deref().unwrap();
    assert_eq!(recorded, "Fix the previous query: use column `week`, not `date`");
    assert!(prompts[1].contains(recorded));
}

#[tokio::test]
async fn test_enrichment_disabled_leaves_slots_absent() {
    let llm = StubLlm::new(&["SELECT 1"]);
    let pipeline = PipelineBuilder::new(config(1, false))
        .llm_client(llm.clone())
        .validator(StubValidator::new(vec![ValidationOutcome::Valid]))
        .executor(StubExecutor::new())
        .table_catalog(StubCatalog::new())
        .catalog_search(Arc::new(StubSearch))
        .build()
        .unwrap();

    let report = pipeline.run("q").await.unwrap();
    assert!(report.session.semantic_context.is_none());
    assert!(report.session.filtered_table_list.is_none());
    // Generator prompt carries no business context section
    assert!(!llm.generation_prompts.lock().unwrap()[0].contains("## Business Context"));
}

#[tokio::test]
async fn test_enrichment_narrows_schema_and_feeds_generator() {
    let llm = StubLlm::new(&["SELECT 1"]);
    let catalog = StubCatalog::new();
    let pipeline = PipelineBuilder::new(config(1, true))
        .llm_client(llm.clone())
        .validator(StubValidator::new(vec![ValidationOutcome::Valid]))
        .executor(StubExecutor::new())
        .table_catalog(catalog.clone())
        .catalog_search(Arc::new(StubSearch))
        .build()
        .unwrap();

    let report = pipeline.run("what is rising?").await.unwrap();

    assert_eq!(
        report.session.filtered_table_list.as_deref(),
        Some(&["top_rising_terms".to_string()][..])
    );
    // Schema inspection used the narrowed list, not list_tables
    assert_eq!(
        catalog.inspected.lock().unwrap().as_slice(),
        ["top_rising_terms".to_string()]
    );
    let context = report.session.semantic_context.clone().unwrap();
    assert!(context.contains("Rising search terms"));
    assert!(llm.generation_prompts.lock().unwrap()[0].contains("## Business Context"));
}

#[tokio::test]
async fn test_schema_inspection_failure_is_fatal() {
    let llm = StubLlm::new(&["SELECT 1"]);
    let pipeline = PipelineBuilder::new(config(1, false))
        .llm_client(llm.clone())
        .validator(StubValidator::new(vec![ValidationOutcome::Valid]))
        .executor(StubExecutor::new())
        .table_catalog(StubCatalog::failing())
        .build()
        .unwrap();

    let err = pipeline.run("q").await.unwrap_err();
    assert!(matches!(err, AgentError::SchemaInspection(_)));
    // The loop never started
    assert_eq!(llm.generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_generator_outage_aborts_pipeline() {
    // One scripted response, then the script runs out and errors on call 2
    let llm = StubLlm::new(&["SELECT a"]);
    let validator = StubValidator::new(vec![ValidationOutcome::invalid("bad")]);
    let executor = StubExecutor::new();

    let pipeline = PipelineBuilder::new(config(3, false))
        .llm_client(llm)
        .validator(validator.clone())
        .executor(executor.clone())
        .table_catalog(StubCatalog::new())
        .build()
        .unwrap();

    let err = pipeline.run("q").await.unwrap_err();
    assert!(matches!(err, AgentError::Generator { .. }));
    // Iteration 1 completed its validate; nothing was executed for real
    assert_eq!(validator.seen.lock().unwrap().len(), 1);
    assert!(executor.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_loop_only_ever_dry_runs() {
    let llm = StubLlm::new(&["SELECT a", "SELECT b", "SELECT c"]);
    let validator = StubValidator::new(vec![
        ValidationOutcome::invalid("x"),
        ValidationOutcome::invalid("y"),
        ValidationOutcome::Valid,
    ]);

    let pipeline = PipelineBuilder::new(config(3, false))
        .llm_client(llm)
        .validator(validator.clone())
        .executor(StubExecutor::new())
        .table_catalog(StubCatalog::new())
        .build()
        .unwrap();

    pipeline.run("q").await.unwrap();

    let seen = validator.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(_, mutating)| !mutating));
}
