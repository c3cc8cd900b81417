//! Durable step log backing orchestrator checkpoints.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `run_steps` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunStepRow {
    pub run_id: i64,
    pub step_name: String,
    pub result: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// Fetches a completed step, if it has been recorded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_run_step(
    pool: &PgPool,
    run_id: i64,
    step_name: &str,
) -> Result<Option<RunStepRow>, DbError> {
    let row = sqlx::query_as::<_, RunStepRow>(
        "SELECT run_id, step_name, result, completed_at \
         FROM run_steps WHERE run_id = $1 AND step_name = $2",
    )
    .bind(run_id)
    .bind(step_name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Completed steps whose name starts with `prefix`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_run_steps(
    pool: &PgPool,
    run_id: i64,
    prefix: &str,
) -> Result<Vec<RunStepRow>, DbError> {
    // left() instead of LIKE so '_' and '%' in step names are literal.
    let rows = sqlx::query_as::<_, RunStepRow>(
        "SELECT run_id, step_name, result, completed_at \
         FROM run_steps \
         WHERE run_id = $1 AND left(step_name, length($2)) = $2 \
         ORDER BY completed_at, step_name",
    )
    .bind(run_id)
    .bind(prefix)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Records a completed step. Returns `false` if it was already recorded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_run_step(
    pool: &PgPool,
    run_id: i64,
    step_name: &str,
    result: &serde_json::Value,
) -> Result<bool, DbError> {
    let outcome = sqlx::query(
        "INSERT INTO run_steps (run_id, step_name, result) VALUES ($1, $2, $3) \
         ON CONFLICT (run_id, step_name) DO NOTHING",
    )
    .bind(run_id)
    .bind(step_name)
    .bind(result)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}
