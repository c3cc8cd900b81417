//! Background job scheduler.
//!
//! Registers the stalled-run sweep: runs whose trigger event was lost, or
//! whose worker died mid-run, are handed back to the dispatcher. Resumption
//! skips every step already recorded for the run.

use chrono::{Duration, Utc};
use leadhound_pipeline::RunDispatcher;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Queued runs older than this are considered missed triggers.
const QUEUED_GRACE_MINUTES: i64 = 2;
/// In-progress runs started longer ago than this are considered abandoned.
const STARTED_GRACE_MINUTES: i64 = 30;
const SWEEP_BATCH: i64 = 50;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    dispatcher: RunDispatcher,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_stalled_run_sweep(&scheduler, pool, dispatcher).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Every minute (`0 * * * * *`), re-dispatch stalled runs.
async fn register_stalled_run_sweep(
    scheduler: &JobScheduler,
    pool: PgPool,
    dispatcher: RunDispatcher,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let dispatcher = dispatcher.clone();

        Box::pin(async move {
            sweep_stalled_runs(&pool, &dispatcher).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn sweep_stalled_runs(pool: &PgPool, dispatcher: &RunDispatcher) {
    let now = Utc::now();
    let runs = match leadhound_db::list_stalled_runs(
        pool,
        now - Duration::minutes(QUEUED_GRACE_MINUTES),
        now - Duration::minutes(STARTED_GRACE_MINUTES),
        SWEEP_BATCH,
    )
    .await
    {
        Ok(runs) => runs,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to list stalled runs");
            return;
        }
    };

    if runs.is_empty() {
        return;
    }

    let mut dispatched = 0_usize;
    for run in &runs {
        if dispatcher.dispatch(run.public_id) {
            dispatched += 1;
            tracing::info!(
                run_id = %run.public_id,
                status = %run.status,
                "scheduler: resuming stalled run"
            );
        }
    }

    tracing::info!(
        stalled = runs.len(),
        dispatched,
        "scheduler: stalled-run sweep complete"
    );
}
