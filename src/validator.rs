//! Query validation
//!
//! A validator dry-runs a candidate query against the real engine and reports
//! whether it would execute, without letting it produce side effects. The
//! convergence loop only ever asks for dry runs; the `mutating` flag exists
//! because the same capability backs final execution elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The candidate is executable as submitted
    Valid,
    /// The candidate failed the dry run; `guidance` is an actionable
    /// diagnostic, not a raw engine payload
    Invalid { guidance: String },
}

impl ValidationOutcome {
    pub fn invalid(guidance: impl Into<String>) -> Self {
        Self::Invalid {
            guidance: guidance.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    /// Diagnostic guidance, present only on the Invalid variant
    pub fn guidance(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid { guidance } => Some(guidance),
        }
    }
}

/// Dry-run validation capability
///
/// Implementations must honor `mutating = false` as a hard guarantee: a dry
/// run may never change engine state. Transport failures are returned as
/// `Err`; the convergence loop downgrades those to Invalid outcomes so a
/// flaky validator cannot crash an attempt.
#[async_trait]
pub trait QueryValidator: Send + Sync {
    async fn validate(&self, query: &str, mutating: bool) -> Result<ValidationOutcome>;
}
