//! Database operations for `leads`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{is_unique_violation, DbError};

const LEAD_COLUMNS: &str = "id, run_id, source, external_id, title, content, author, url, \
     community, score, num_comments, published_at, intent, relevance, relevance_reason, \
     created_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `leads` table.
///
/// `id` is assigned in insertion order and doubles as the fetch order used to
/// break relevance ties.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeadRow {
    pub id: i64,
    pub run_id: i64,
    pub source: String,
    pub external_id: String,
    pub title: String,
    /// Sanitized body.
    pub content: String,
    pub author: String,
    pub url: String,
    pub community: Option<String>,
    pub score: i64,
    pub num_comments: i64,
    pub published_at: Option<DateTime<Utc>>,
    /// `NULL` until the classifier has kept the lead.
    pub intent: Option<String>,
    pub relevance: Option<i16>,
    pub relevance_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An unscored candidate ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub url: String,
    pub community: Option<String>,
    pub score: i64,
    pub num_comments: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Result of [`insert_lead`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// `(run_id, source, external_id)` was already present.
    AlreadyExists,
}

/// Classifier verdict for a lead that met the relevance floor.
#[derive(Debug, Clone)]
pub struct LeadAnnotation {
    pub lead_id: i64,
    pub intent: String,
    pub relevance: i16,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// leads operations
// ---------------------------------------------------------------------------

/// Inserts an unscored lead.
///
/// A duplicate `(run_id, source, external_id)` is reported as
/// [`InsertOutcome::AlreadyExists`], never as an error, including when a
/// concurrent writer wins the race.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] for any other database failure.
pub async fn insert_lead(
    pool: &PgPool,
    run_id: i64,
    lead: &NewLead,
) -> Result<InsertOutcome, DbError> {
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO leads \
             (run_id, source, external_id, title, content, author, url, community, \
              score, num_comments, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (run_id, source, external_id) DO NOTHING \
         RETURNING id",
    )
    .bind(run_id)
    .bind(&lead.source)
    .bind(&lead.external_id)
    .bind(&lead.title)
    .bind(&lead.content)
    .bind(&lead.author)
    .bind(&lead.url)
    .bind(lead.community.as_deref())
    .bind(lead.score)
    .bind(lead.num_comments)
    .bind(lead.published_at)
    .fetch_optional(pool)
    .await;

    match inserted {
        Ok(Some(id)) => Ok(InsertOutcome::Inserted(id)),
        Ok(None) => Ok(InsertOutcome::AlreadyExists),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

/// `(source, external_id)` pairs already persisted for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_lead_keys(pool: &PgPool, run_id: i64) -> Result<Vec<(String, String)>, DbError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT source, external_id FROM leads WHERE run_id = $1 ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_leads(pool: &PgPool, run_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leads WHERE run_id = $1")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Leads the classifier has not scored yet, in fetch order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unscored_leads(pool: &PgPool, run_id: i64) -> Result<Vec<LeadRow>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE run_id = $1 AND relevance IS NULL ORDER BY id"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// `(id, relevance)` for every scored lead, in fetch order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scored_relevance(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<(i64, i16)>, DbError> {
    let rows = sqlx::query_as::<_, (i64, i16)>(
        "SELECT id, relevance FROM leads \
         WHERE run_id = $1 AND relevance IS NOT NULL \
         ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All leads for a run, most relevant first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_leads(pool: &PgPool, run_id: i64) -> Result<Vec<LeadRow>, DbError> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE run_id = $1 \
         ORDER BY relevance DESC NULLS LAST, id"
    );
    let rows = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Deletes the given leads of a run. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_leads(pool: &PgPool, run_id: i64, ids: &[i64]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM leads WHERE run_id = $1 AND id = ANY($2)")
        .bind(run_id)
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Deletes every lead of a run that never received a score.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_unscored_leads(pool: &PgPool, run_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM leads WHERE run_id = $1 AND relevance IS NULL")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Applies one classified batch and records its step, in a single transaction.
///
/// Kept leads are annotated, discarded leads are deleted, and the
/// `(run_id, step_name)` row is written to `run_steps`. Either all of it is
/// visible afterwards or none of it is.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails.
pub async fn apply_classification(
    pool: &PgPool,
    run_id: i64,
    step_name: &str,
    annotations: &[LeadAnnotation],
    discard_ids: &[i64],
    result: &serde_json::Value,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for annotation in annotations {
        sqlx::query(
            "UPDATE leads \
             SET intent = $1, relevance = $2, relevance_reason = $3 \
             WHERE run_id = $4 AND id = $5",
        )
        .bind(&annotation.intent)
        .bind(annotation.relevance)
        .bind(&annotation.reason)
        .bind(run_id)
        .bind(annotation.lead_id)
        .execute(&mut *tx)
        .await?;
    }

    if !discard_ids.is_empty() {
        sqlx::query("DELETE FROM leads WHERE run_id = $1 AND id = ANY($2)")
            .bind(run_id)
            .bind(discard_ids)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "INSERT INTO run_steps (run_id, step_name, result) VALUES ($1, $2, $3) \
         ON CONFLICT (run_id, step_name) DO NOTHING",
    )
    .bind(run_id)
    .bind(step_name)
    .bind(result)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
