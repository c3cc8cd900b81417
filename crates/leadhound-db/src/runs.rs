//! Database operations for `runs`.

use chrono::{DateTime, Utc};
use leadhound_core::{Platform, RunConfiguration, RunStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, customer_id, website_url, description, keywords, \
     competitors, platform, lead_tier, time_window, max_age_days, target_count, \
     posts_per_keyword_limit, recipient_email, status, lead_count, warnings, error_message, \
     created_at, started_at, completed_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    /// The `runId` carried by trigger events and exposed to the UI.
    pub public_id: Uuid,
    pub customer_id: Uuid,
    pub website_url: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub competitors: Vec<String>,
    pub platform: String,
    /// Exactly one of `lead_tier` / `time_window` is set (table CHECK).
    pub lead_tier: Option<String>,
    pub time_window: Option<String>,
    pub max_age_days: i32,
    pub target_count: i32,
    pub posts_per_keyword_limit: i32,
    pub recipient_email: Option<String>,
    pub status: String,
    pub lead_count: i32,
    /// JSON array of non-fatal warning strings accumulated by the run.
    pub warnings: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for [`create_run`].
#[derive(Debug, Clone)]
pub struct NewRun {
    pub customer_id: Uuid,
    pub website_url: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub competitors: Vec<String>,
    pub platform: Platform,
    pub configuration: RunConfiguration,
    pub recipient_email: Option<String>,
    /// `true` leaves the run in `PENDING_PAYMENT` for the billing flow to release.
    pub awaiting_payment: bool,
}

// ---------------------------------------------------------------------------
// runs operations
// ---------------------------------------------------------------------------

/// Creates a run, resolving its tier or time window to concrete parameters.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_run(pool: &PgPool, run: &NewRun) -> Result<RunRow, DbError> {
    let params = run.configuration.resolve();
    let status = if run.awaiting_payment {
        RunStatus::PendingPayment
    } else {
        RunStatus::Queued
    };

    let sql = format!(
        "INSERT INTO runs \
             (public_id, customer_id, website_url, description, keywords, competitors, \
              platform, lead_tier, time_window, max_age_days, target_count, \
              posts_per_keyword_limit, recipient_email, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING {RUN_COLUMNS}"
    );

    let row = sqlx::query_as::<_, RunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(run.customer_id)
        .bind(&run.website_url)
        .bind(&run.description)
        .bind(&run.keywords)
        .bind(&run.competitors)
        .bind(run.platform.as_str())
        .bind(run.configuration.lead_tier().map(|t| t.as_str()))
        .bind(run.configuration.time_window().map(|w| w.as_str()))
        .bind(to_i32(params.max_age_days))
        .bind(to_i32(params.target_count))
        .bind(to_i32(params.posts_per_keyword_limit))
        .bind(run.recipient_email.as_deref())
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Fetches a run by its public id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has that id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_run(pool: &PgPool, public_id: Uuid) -> Result<RunRow, DbError> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE public_id = $1");
    sqlx::query_as::<_, RunRow>(&sql)
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Moves a run from `from` to `to`.
///
/// The update only matches while the row is still in `from`, so a stale
/// writer can never move a run backwards. Entering `FETCHING_LEADS` stamps
/// `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the edge is not part of the
/// state machine or the row is no longer in `from`.
pub async fn transition_run_status(
    pool: &PgPool,
    id: i64,
    from: RunStatus,
    to: RunStatus,
) -> Result<(), DbError> {
    if !from.can_transition_to(to) {
        return Err(DbError::InvalidRunTransition { id, from, to });
    }

    let result = sqlx::query(
        "UPDATE runs \
         SET status = $1, \
             started_at = CASE WHEN $1 = 'FETCHING_LEADS' THEN COALESCE(started_at, NOW()) \
                               ELSE started_at END \
         WHERE id = $2 AND status = $3",
    )
    .bind(to.as_str())
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition { id, from, to });
    }

    Ok(())
}

/// Marks a run `COMPLETED` with its final lead count and warnings.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not in `from` or
/// `from` cannot complete.
pub async fn complete_run(
    pool: &PgPool,
    id: i64,
    from: RunStatus,
    lead_count: i32,
    warnings: &[String],
) -> Result<(), DbError> {
    let to = RunStatus::Completed;
    if !from.can_transition_to(to) {
        return Err(DbError::InvalidRunTransition { id, from, to });
    }

    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'COMPLETED', completed_at = NOW(), lead_count = $1, warnings = $2 \
         WHERE id = $3 AND status = $4",
    )
    .bind(lead_count)
    .bind(serde_json::json!(warnings))
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition { id, from, to });
    }

    Ok(())
}

/// Marks a `QUEUED` run `FAILED` with a reason.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is no longer queued.
pub async fn fail_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'FAILED', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'QUEUED'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            from: RunStatus::Queued,
            to: RunStatus::Failed,
        });
    }

    Ok(())
}

/// Runs the orchestrator may pick up, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runnable_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM runs \
         WHERE status IN ('QUEUED', 'FETCHING_LEADS', 'ANALYZING_LEADS') \
         ORDER BY created_at, id \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, RunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Runs that look abandoned: queued since before `queued_before`, or started
/// before `started_before` without reaching a terminal status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stalled_runs(
    pool: &PgPool,
    queued_before: DateTime<Utc>,
    started_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<RunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM runs \
         WHERE (status = 'QUEUED' AND created_at < $1) \
            OR (status IN ('FETCHING_LEADS', 'ANALYZING_LEADS') AND started_at < $2) \
         ORDER BY created_at, id \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, RunRow>(&sql)
        .bind(queued_before)
        .bind(started_before)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
