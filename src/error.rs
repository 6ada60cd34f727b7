//! Error taxonomy for the SQL agent pipeline
//!
//! Distinguishes fatal faults (missing preconditions, generator transport
//! failures) from outcomes the pipeline handles as normal control flow.
//! Loop exhaustion is deliberately NOT an error: it is a terminal status on
//! [`crate::convergence::LoopResult`] that the pipeline reports to the user.

use thiserror::Error;

use crate::convergence::AttemptRecord;

/// Fatal errors for a single pipeline invocation
#[derive(Error, Debug)]
pub enum AgentError {
    /// The convergence loop was started without a schema. This is a
    /// sequencing bug in the caller, never retried.
    #[error("schema is missing or empty; schema inspection must complete before SQL generation")]
    MissingSchema,

    /// The LLM backing the generator was unreachable or returned an error.
    /// No candidate was produced, so this is not an Invalid outcome. The
    /// attempts completed before the failure are retained for diagnostics.
    #[error("SQL generator call failed after {n} completed attempt(s): {error}", n = .attempts.len())]
    Generator {
        error: anyhow::Error,
        attempts: Vec<AttemptRecord>,
    },

    /// Schema inspection could not produce a schema document.
    #[error("schema inspection failed: {0}")]
    SchemaInspection(anyhow::Error),

    /// The final (non-dry-run) execution of a validated query failed.
    /// Dry-run transport faults never take this path; the loop downgrades
    /// those to Invalid outcomes.
    #[error("query execution failed: {0}")]
    Execution(anyhow::Error),
}
