//! `run` sub-commands: create, execute, inspect and drain runs.

mod query;

use clap::Subcommand;
use futures::stream::{self, StreamExt};
use leadhound_core::{LeadTier, Platform, RunConfiguration, TimeWindow};
use leadhound_pipeline::{Orchestrator, PipelineError, RunOutcome};
use uuid::Uuid;

use query::run_status;

/// Sub-commands available under `run`.
#[derive(Debug, Subcommand)]
pub enum RunCommands {
    /// Create a run (what the billing flow does once payment clears)
    Create {
        /// Customer the run belongs to (random when omitted)
        #[arg(long)]
        customer: Option<Uuid>,
        /// The customer's product website
        #[arg(long)]
        website: String,
        /// One-paragraph product description given to the classifier
        #[arg(long)]
        description: String,
        /// Search keyword (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        /// Competitor name, searched as "<name> alternative" (repeatable)
        #[arg(long = "competitor")]
        competitors: Vec<String>,
        /// reddit, hackernews, twitter or linkedin
        #[arg(long, default_value = "reddit")]
        platform: Platform,
        /// Purchased tier: starter, growth or scale
        #[arg(long, conflicts_with = "window")]
        tier: Option<LeadTier>,
        /// Search window: week, month or quarter
        #[arg(long)]
        window: Option<TimeWindow>,
        /// Address notified when leads are delivered
        #[arg(long)]
        recipient: Option<String>,
        /// Leave the run in PENDING_PAYMENT instead of QUEUED
        #[arg(long)]
        awaiting_payment: bool,
    },
    /// Execute (or resume) one run in the foreground
    Execute {
        #[arg(long)]
        id: Uuid,
    },
    /// Show a run, its step log and its leads
    Status {
        #[arg(long)]
        id: Uuid,
    },
    /// Execute every runnable run, bounded by LEADHOUND_MAX_CONCURRENT_RUNS
    Drain {
        /// Maximum number of runs to pick up
        #[arg(long, default_value = "100")]
        limit: i64,
    },
}

pub(crate) async fn run_run_command(
    pool: &sqlx::PgPool,
    config: &leadhound_core::AppConfig,
    command: RunCommands,
) -> anyhow::Result<()> {
    match command {
        RunCommands::Create {
            customer,
            website,
            description,
            keywords,
            competitors,
            platform,
            tier,
            window,
            recipient,
            awaiting_payment,
        } => {
            let new_run = leadhound_db::NewRun {
                customer_id: customer.unwrap_or_else(Uuid::new_v4),
                website_url: website,
                description,
                keywords,
                competitors,
                platform,
                configuration: configuration(tier, window)?,
                recipient_email: recipient,
                awaiting_payment,
            };
            run_create(pool, &new_run).await
        }
        RunCommands::Execute { id } => {
            let orchestrator = leadhound_pipeline::orchestrator_from_config(config, pool.clone())?;
            let outcome = orchestrator.execute(id).await?;
            print_outcome(&outcome);
            Ok(())
        }
        RunCommands::Status { id } => run_status(pool, id).await,
        RunCommands::Drain { limit } => run_drain(pool, config, limit).await,
    }
}

/// Exactly one of `--tier` / `--window` must be given.
fn configuration(
    tier: Option<LeadTier>,
    window: Option<TimeWindow>,
) -> anyhow::Result<RunConfiguration> {
    match (tier, window) {
        (Some(tier), None) => Ok(RunConfiguration::Tier(tier)),
        (None, Some(window)) => Ok(RunConfiguration::Window(window)),
        (None, None) => anyhow::bail!("pass either --tier or --window"),
        (Some(_), Some(_)) => anyhow::bail!("--tier and --window are mutually exclusive"),
    }
}

async fn run_create(pool: &sqlx::PgPool, new_run: &leadhound_db::NewRun) -> anyhow::Result<()> {
    if new_run.keywords.iter().all(|k| k.trim().is_empty())
        && new_run.competitors.iter().all(|c| c.trim().is_empty())
    {
        tracing::warn!("run has no keywords or competitors; it will fail when executed");
    }

    let row = leadhound_db::create_run(pool, new_run).await?;
    println!(
        "created run {} ({}, target {} leads, max age {} days)",
        row.public_id, row.status, row.target_count, row.max_age_days
    );
    Ok(())
}

async fn run_drain(
    pool: &sqlx::PgPool,
    config: &leadhound_core::AppConfig,
    limit: i64,
) -> anyhow::Result<()> {
    let runs = leadhound_db::list_runnable_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no runnable runs");
        return Ok(());
    }

    let orchestrator: Orchestrator =
        leadhound_pipeline::orchestrator_from_config(config, pool.clone())?;
    let max_concurrent = config.max_concurrent_runs.max(1);
    tracing::info!(runs = runs.len(), max_concurrent, "draining runnable runs");

    let results: Vec<_> = stream::iter(&runs)
        .map(|run| {
            let orchestrator = &orchestrator;
            async move { (run.public_id, orchestrator.execute(run.public_id).await) }
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    let mut failed = 0_usize;
    let mut deferred = 0_usize;
    for (id, result) in &results {
        match result {
            Ok(outcome) => print_outcome(outcome),
            Err(e) if is_deferred(e) => {
                deferred += 1;
                tracing::info!(run_id = %id, reason = %e, "run skipped");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(run_id = %id, error = %e, "run execution failed");
            }
        }
    }

    println!(
        "drained {} run(s), {failed} failed, {deferred} busy elsewhere",
        results.len()
    );
    if failed > 0 && failed == results.len() {
        anyhow::bail!("all {failed} runs failed to execute");
    }
    Ok(())
}

/// The run was left alone because another executor holds it or the shared
/// slots are full.
fn is_deferred(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::AlreadyRunning { .. } | PipelineError::AtCapacity { .. }
    )
}

fn print_outcome(outcome: &RunOutcome) {
    println!(
        "run {}: {} with {} lead(s)",
        outcome.run_id, outcome.status, outcome.lead_count
    );
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
}
