//! Command-line harness for the SQL agent
//!
//! Runs one question through the full pipeline against a live toolbox and
//! LLM backend. Requires the `cli` feature.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sql_agent::pipeline::{PipelineBuilder, PipelineOutcome};
use sql_agent::AgentConfig;

#[derive(Parser)]
#[command(name = "sql_agent", about = "Answer a natural-language question with SQL")]
struct Args {
    /// The question to answer
    question: String,

    /// Override the convergence loop iteration budget
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Force the enrichment phase on, regardless of DATAPLEX_ENABLED
    #[arg(long)]
    enrich: bool,

    /// Print the attempt trail after the answer
    #[arg(long)]
    show_attempts: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = AgentConfig::from_env()?;
    if let Some(n) = args.max_iterations {
        config = config.with_max_iterations(n);
    }
    if args.enrich {
        config = config.with_enrichment(true);
    }

    let pipeline = PipelineBuilder::new(config).build()?;
    let report = pipeline.run(&args.question).await?;

    match &report.outcome {
        PipelineOutcome::Answered { query, answer, .. } => {
            println!("{}\n", answer);
            println!("Executed SQL:\n{}", query);
        }
        PipelineOutcome::NotAnswered { explanation, .. } => {
            println!("{}", explanation);
        }
    }

    if args.show_attempts {
        println!("\nAttempts:");
        for attempt in &report.attempts {
            let status = if attempt.outcome.is_valid() {
                "valid"
            } else {
                "invalid"
            };
            println!("  [{}] {}: {}", attempt.iteration, status, attempt.candidate_sql);
        }
    }

    Ok(())
}
