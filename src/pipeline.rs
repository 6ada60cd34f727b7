//! Pipeline controller
//!
//! Sequences the phases around the convergence loop and projects their
//! results into the per-request [`SessionState`]. Deliberately thin: no
//! business logic lives here beyond ordering and state transfer.
//!
//! Phase order is fixed: optional Enrichment → Schema Acquisition →
//! Convergence Loop → Final Execution.

use std::sync::Arc;

use anyhow::Result;

use crate::client_factory::create_llm_client;
use crate::config::AgentConfig;
use crate::convergence::{AttemptRecord, ConvergenceLoop};
use crate::enricher::{CatalogSearch, SemanticEnricher};
use crate::error::AgentError;
use crate::generator::SqlGenerator;
use crate::llm_client::LlmClient;
use crate::responder::{exhaustion_report, FinalResponder, QueryExecutor};
use crate::schema_inspector::{SchemaInspector, TableCatalog};
use crate::session::SessionState;
use crate::toolbox::ToolboxClient;
use crate::validator::QueryValidator;

/// User-visible result of one pipeline run
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The loop converged; the query was executed for real
    Answered {
        query: String,
        rows: Vec<serde_json::Value>,
        answer: String,
    },
    /// The loop exhausted its budget; nothing was executed
    NotAnswered {
        last_candidate: Option<String>,
        guidance: Option<String>,
        explanation: String,
    },
}

/// Outcome plus the session and attempt trail, for callers that want the
/// diagnostics
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub session: SessionState,
    pub attempts: Vec<AttemptRecord>,
}

/// The full NL-to-SQL agent
pub struct SqlAgentPipeline {
    config: AgentConfig,
    generator: SqlGenerator,
    validator: Arc<dyn QueryValidator>,
    executor: Arc<dyn QueryExecutor>,
    table_catalog: Arc<dyn TableCatalog>,
    catalog_search: Option<Arc<dyn CatalogSearch>>,
    enricher: Option<SemanticEnricher>,
    responder: FinalResponder,
}

impl SqlAgentPipeline {
    /// Build from environment configuration, with the toolbox backing every
    /// engine-facing capability.
    pub fn from_env() -> Result<Self> {
        PipelineBuilder::new(AgentConfig::from_env()?).build()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer one question end to end.
    pub async fn run(&self, question: &str) -> Result<PipelineReport, AgentError> {
        let mut state = SessionState::new(question);
        tracing::info!(request_id = %state.request_id, question, "pipeline start");

        // Phase 1: enrichment (optional, best-effort)
        if let (Some(enricher), Some(catalog)) = (&self.enricher, &self.catalog_search) {
            match enricher.enrich(question, catalog.as_ref()).await {
                Ok(output) => {
                    state.semantic_context = output.semantic_context;
                    state.filtered_table_list = output.filtered_table_list;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "enrichment failed, continuing without context");
                }
            }
        }

        // Phase 2: schema acquisition
        let inspector = SchemaInspector::new(self.table_catalog.as_ref(), &self.config.dataset);
        let schema = inspector
            .inspect(state.filtered_table_list.as_deref())
            .await
            .map_err(AgentError::SchemaInspection)?;
        state.schema = Some(schema);

        // Phase 3: convergence loop
        let convergence = ConvergenceLoop::new(
            &self.generator,
            self.validator.as_ref(),
            self.config.max_iterations,
        );
        let result = convergence
            .run(
                state.schema.as_deref().unwrap_or_default(),
                question,
                state.semantic_context.as_deref(),
            )
            .await?;

        state.candidate_sql = result.last_candidate().map(String::from);
        state.guidance = result.final_guidance.clone();
        state.sql_is_valid = Some(result.converged());
        state.valid_sql = result.final_query.clone();

        // Phase 4: final execution
        let outcome = match &state.valid_sql {
            Some(query) => {
                let rows = self
                    .executor
                    .execute(query)
                    .await
                    .map_err(AgentError::Execution)?;
                let answer = self.responder.respond(question, query, &rows).await;
                PipelineOutcome::Answered {
                    query: query.clone(),
                    rows,
                    answer,
                }
            }
            None => PipelineOutcome::NotAnswered {
                last_candidate: state.candidate_sql.clone(),
                guidance: state.guidance.clone(),
                explanation: exhaustion_report(
                    state.candidate_sql.as_deref(),
                    state.guidance.as_deref(),
                ),
            },
        };

        tracing::info!(
            request_id = %state.request_id,
            converged = state.sql_is_valid.unwrap_or(false),
            attempts = result.attempts.len(),
            "pipeline done"
        );

        Ok(PipelineReport {
            outcome,
            session: state,
            attempts: result.attempts,
        })
    }
}

/// Builder for [`SqlAgentPipeline`]
///
/// Capabilities not supplied explicitly default to a shared
/// [`ToolboxClient`] (engine-facing) and the environment-selected LLM.
pub struct PipelineBuilder {
    config: AgentConfig,
    llm: Option<Arc<dyn LlmClient>>,
    validator: Option<Arc<dyn QueryValidator>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    table_catalog: Option<Arc<dyn TableCatalog>>,
    catalog_search: Option<Arc<dyn CatalogSearch>>,
}

impl PipelineBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            llm: None,
            validator: None,
            executor: None,
            table_catalog: None,
            catalog_search: None,
        }
    }

    pub fn llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn QueryValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn table_catalog(mut self, catalog: Arc<dyn TableCatalog>) -> Self {
        self.table_catalog = Some(catalog);
        self
    }

    pub fn catalog_search(mut self, search: Arc<dyn CatalogSearch>) -> Self {
        self.catalog_search = Some(search);
        self
    }

    pub fn build(self) -> Result<SqlAgentPipeline> {
        let llm = match self.llm {
            Some(client) => client,
            None => create_llm_client()?,
        };

        // One toolbox client backs every capability the caller didn't override
        let toolbox = Arc::new(ToolboxClient::new(&self.config.toolbox_url));

        let validator: Arc<dyn QueryValidator> = match self.validator {
            Some(v) => v,
            None => toolbox.clone(),
        };
        let executor: Arc<dyn QueryExecutor> = match self.executor {
            Some(e) => e,
            None => toolbox.clone(),
        };
        let table_catalog: Arc<dyn TableCatalog> = match self.table_catalog {
            Some(c) => c,
            None => toolbox.clone(),
        };

        let catalog_search: Option<Arc<dyn CatalogSearch>> = if self.config.enrichment_enabled {
            Some(match self.catalog_search {
                Some(s) => s,
                None => toolbox.clone(),
            })
        } else {
            None
        };

        let enricher = self
            .config
            .enrichment_enabled
            .then(|| SemanticEnricher::new(llm.clone()));

        Ok(SqlAgentPipeline {
            generator: SqlGenerator::new(llm.clone()),
            responder: FinalResponder::new(llm),
            config: self.config,
            validator,
            executor,
            table_catalog,
            catalog_search,
            enricher,
        })
    }
}
