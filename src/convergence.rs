//! Convergence loop
//!
//! Drives bounded generate → validate → review rounds until a candidate query
//! passes a dry run or the iteration budget runs out. Guidance derived from a
//! failed dry run is fed into the next generation attempt; only the most
//! recent guidance is carried, never the full history.
//!
//! Termination is owned here: the loop returns an explicit
//! [`LoopStatus::Converged`] or [`LoopStatus::Exhausted`], and exhaustion is a
//! normal outcome rather than an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::generator::{GenerationRequest, SqlGenerator};
use crate::validator::{QueryValidator, ValidationOutcome};

/// Upper bound on the guidance text carried between iterations. Dry-run
/// diagnostics from the engine can be multi-kilobyte dumps; the generator
/// only needs the actionable core.
const MAX_GUIDANCE_CHARS: usize = 300;

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStatus {
    /// A candidate passed the dry run within budget
    Converged,
    /// Every iteration produced an invalid candidate
    Exhausted,
}

/// One iteration's candidate, outcome, and carried guidance. Immutable once
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based iteration number
    pub iteration: usize,
    pub candidate_sql: String,
    pub outcome: ValidationOutcome,
    /// Guidance derived from this attempt, handed to the next Generate call.
    /// Absent on a converged attempt.
    pub guidance: Option<String>,
    pub at: DateTime<Utc>,
}

/// Final state of one loop invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub status: LoopStatus,
    /// The converged query. Set if and only if status is `Converged`.
    pub final_query: Option<String>,
    /// Last guidance produced, for the exhaustion report
    pub final_guidance: Option<String>,
    /// All attempts, oldest first
    pub attempts: Vec<AttemptRecord>,
}

impl LoopResult {
    pub fn converged(&self) -> bool {
        self.status == LoopStatus::Converged
    }

    /// The most recent candidate, valid or not
    pub fn last_candidate(&self) -> Option<&str> {
        self.attempts.last().map(|a| a.candidate_sql.as_str())
    }
}

/// Bounded generate/validate/review loop
pub struct ConvergenceLoop<'a> {
    generator: &'a SqlGenerator,
    validator: &'a dyn QueryValidator,
    max_iterations: usize,
}

impl<'a> ConvergenceLoop<'a> {
    /// `max_iterations` below 1 is clamped: the loop always attempts at
    /// least one full cycle.
    pub fn new(
        generator: &'a SqlGenerator,
        validator: &'a dyn QueryValidator,
        max_iterations: usize,
    ) -> Self {
        Self {
            generator,
            validator,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Run the loop to completion.
    ///
    /// Exactly one Generate and one Validate call happen per iteration, and
    /// the validator always sees the query generated in the same iteration.
    /// A generator failure is fatal; a validator transport failure is
    /// downgraded to an Invalid outcome so the loop can keep iterating.
    pub async fn run(
        &self,
        schema: &str,
        question: &str,
        semantic_context: Option<&str>,
    ) -> Result<LoopResult, AgentError> {
        if schema.trim().is_empty() {
            return Err(AgentError::MissingSchema);
        }

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(self.max_iterations);
        let mut guidance: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            tracing::info!(iteration, max = self.max_iterations, "convergence iteration");

            // Generate
            let request = GenerationRequest {
                schema,
                question,
                semantic_context,
                guidance: guidance.as_deref(),
            };
            let candidate_sql = match self.generator.generate(&request).await {
                Ok(sql) => sql,
                Err(error) => {
                    // Fatal: no candidate exists to validate. Completed
                    // attempts travel with the error for diagnostics.
                    return Err(AgentError::Generator { error, attempts });
                }
            };

            // Validate: always a dry run, never mutating
            let outcome = match self.validator.validate(&candidate_sql, false).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "validator transport failure, treating as invalid");
                    ValidationOutcome::invalid(format!(
                        "the dry run could not be performed ({}); regenerate the query as plain standard SQL",
                        e
                    ))
                }
            };

            // Review
            match outcome {
                ValidationOutcome::Valid => {
                    tracing::info!(iteration, "candidate passed dry run, converged");
                    attempts.push(AttemptRecord {
                        iteration,
                        candidate_sql: candidate_sql.clone(),
                        outcome: ValidationOutcome::Valid,
                        guidance: None,
                        at: Utc::now(),
                    });
                    // Mandatory early exit: a later iteration could replace a
                    // valid result with a worse one.
                    return Ok(LoopResult {
                        status: LoopStatus::Converged,
                        final_query: Some(candidate_sql),
                        final_guidance: None,
                        attempts,
                    });
                }
                ValidationOutcome::Invalid { guidance: diag } => {
                    let next_guidance = derive_guidance(&diag);
                    tracing::debug!(iteration, guidance = %next_guidance, "candidate rejected");
                    attempts.push(AttemptRecord {
                        iteration,
                        candidate_sql,
                        outcome: ValidationOutcome::Invalid { guidance: diag },
                        guidance: Some(next_guidance.clone()),
                        at: Utc::now(),
                    });
                    guidance = Some(next_guidance);
                }
            }
        }

        tracing::warn!(
            iterations = self.max_iterations,
            "iteration budget exhausted without a valid candidate"
        );
        Ok(LoopResult {
            status: LoopStatus::Exhausted,
            final_query: None,
            final_guidance: guidance,
            attempts,
        })
    }
}

/// Condense a dry-run diagnostic into a short fix instruction for the next
/// generation attempt.
fn derive_guidance(diagnostic: &str) -> String {
    let core = diagnostic
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("the dry run failed without a diagnostic");

    let truncated = core.chars().count() > MAX_GUIDANCE_CHARS;
    let mut core: String = core.chars().take(MAX_GUIDANCE_CHARS).collect();
    if truncated {
        core.push('…');
    }

    format!("Fix the previous query: {}", core)
}
