//! LLM-powered natural-language-to-SQL agent
//!
//! This crate turns a natural-language question into a validated, executed SQL
//! query through a fixed sequence of phases:
//!
//! ```text
//! Question → [Enrichment] → Schema Inspection → Convergence Loop → Execution
//! ```
//!
//! The convergence loop is the core: it drives bounded generate → validate →
//! review rounds, feeding validator guidance back into the next generation
//! attempt until the candidate passes a dry run or the iteration budget is
//! exhausted.
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API

// LLM client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;

// Core agent modules
pub mod config;
pub mod convergence;
pub mod enricher;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod responder;
pub mod schema_inspector;
pub mod session;
pub mod toolbox;
pub mod validator;

#[cfg(test)]
mod pipeline_tests;

// Re-exports for convenience
pub use backend::AgentBackend;
pub use client_factory::{create_llm_client, create_llm_client_with_key};
pub use config::AgentConfig;
pub use convergence::{AttemptRecord, ConvergenceLoop, LoopResult, LoopStatus};
pub use error::AgentError;
pub use generator::{GenerationRequest, SqlGenerator};
pub use llm_client::LlmClient;
pub use pipeline::{PipelineBuilder, PipelineOutcome, PipelineReport, SqlAgentPipeline};
pub use session::SessionState;
pub use validator::{QueryValidator, ValidationOutcome};
