//! [`RunStore`] over Postgres.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use leadhound_core::{Platform, RunConfiguration, RunParameters, RunStatus};
use leadhound_db::{
    ClaimOutcome, DbError, ExecutionClaim, InsertOutcome, LeadAnnotation, NewLead, RunRow,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{ClaimStatus, PendingLead, RunRecord, RunStore, StepEntry};

/// Execution claims are Postgres advisory locks, so `execution_slots` bounds
/// runs in flight across every process connected to the same database.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
    execution_slots: u32,
    claims: Arc<Mutex<HashMap<i64, ExecutionClaim>>>,
}

impl PgRunStore {
    #[must_use]
    pub fn new(pool: PgPool, execution_slots: usize) -> Self {
        Self {
            pool,
            execution_slots: u32::try_from(execution_slots.max(1)).unwrap_or(u32::MAX),
            claims: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Maps a `runs` row onto the orchestrator's view of it.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if the status, platform or configuration
/// columns hold values the domain types do not know.
pub fn run_record_from_row(row: RunRow) -> Result<RunRecord, StoreError> {
    let id = row.id;
    let corrupt = move |reason: String| StoreError::Corrupt { id, reason };

    let status: RunStatus = row.status.parse::<RunStatus>().map_err(|e| corrupt(e.to_string()))?;
    let platform: Platform = row.platform.parse::<Platform>().map_err(|e| corrupt(e.to_string()))?;
    // The configuration must still be well-formed even though the resolved
    // numbers below are what the run executes with.
    RunConfiguration::from_columns(row.lead_tier.as_deref(), row.time_window.as_deref())
        .map_err(|e| corrupt(e.to_string()))?;

    let params = RunParameters {
        max_age_days: non_negative(row.max_age_days),
        target_count: non_negative(row.target_count),
        posts_per_keyword_limit: non_negative(row.posts_per_keyword_limit),
    };
    let warnings = row
        .warnings
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|w| w.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    Ok(RunRecord {
        id: row.id,
        public_id: row.public_id,
        website_url: row.website_url,
        description: row.description,
        keywords: row.keywords,
        competitors: row.competitors,
        platform,
        params,
        recipient_email: row.recipient_email,
        status,
        lead_count: non_negative(row.lead_count),
        warnings,
    })
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn load_run(&self, public_id: Uuid) -> Result<RunRecord, StoreError> {
        match leadhound_db::get_run(&self.pool, public_id).await {
            Ok(row) => run_record_from_row(row),
            Err(DbError::NotFound) => Err(StoreError::RunNotFound(public_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_claim(&self, run_id: i64) -> Result<ClaimStatus, StoreError> {
        match leadhound_db::try_claim_execution(&self.pool, run_id, self.execution_slots).await? {
            ClaimOutcome::Claimed(claim) => {
                tracing::debug!(run_id, slot = claim.slot(), "execution claim taken");
                let previous = self
                    .claims
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(run_id, claim);
                // Dropping a stale claim closes its session and frees its locks.
                drop(previous);
                Ok(ClaimStatus::Claimed)
            }
            ClaimOutcome::RunBusy => Ok(ClaimStatus::RunBusy),
            ClaimOutcome::AtCapacity => Ok(ClaimStatus::AtCapacity),
        }
    }

    async fn release_claim(&self, run_id: i64) -> Result<(), StoreError> {
        let claim = self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run_id);
        if let Some(claim) = claim {
            claim.release().await?;
        }
        Ok(())
    }

    async fn transition(
        &self,
        run_id: i64,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), StoreError> {
        leadhound_db::transition_run_status(&self.pool, run_id, from, to).await?;
        Ok(())
    }

    async fn fail(&self, run_id: i64, reason: &str) -> Result<(), StoreError> {
        leadhound_db::fail_run(&self.pool, run_id, reason).await?;
        Ok(())
    }

    async fn complete(
        &self,
        run_id: i64,
        from: RunStatus,
        lead_count: u32,
        warnings: &[String],
    ) -> Result<(), StoreError> {
        let lead_count = i32::try_from(lead_count).unwrap_or(i32::MAX);
        leadhound_db::complete_run(&self.pool, run_id, from, lead_count, warnings).await?;
        Ok(())
    }

    async fn persisted_keys(&self, run_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        Ok(leadhound_db::list_lead_keys(&self.pool, run_id).await?)
    }

    async fn insert_lead(
        &self,
        run_id: i64,
        lead: &NewLead,
    ) -> Result<InsertOutcome, StoreError> {
        Ok(leadhound_db::insert_lead(&self.pool, run_id, lead).await?)
    }

    async fn count_leads(&self, run_id: i64) -> Result<u32, StoreError> {
        let count = leadhound_db::count_leads(&self.pool, run_id).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn unscored_leads(&self, run_id: i64) -> Result<Vec<PendingLead>, StoreError> {
        let rows = leadhound_db::list_unscored_leads(&self.pool, run_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| PendingLead {
                id: row.id,
                external_id: row.external_id,
                title: row.title,
                content: row.content,
                community: row.community,
            })
            .collect())
    }

    async fn apply_classification(
        &self,
        run_id: i64,
        step: &str,
        annotations: &[LeadAnnotation],
        discard_ids: &[i64],
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        leadhound_db::apply_classification(
            &self.pool,
            run_id,
            step,
            annotations,
            discard_ids,
            result,
        )
        .await?;
        Ok(())
    }

    async fn scored_relevance(&self, run_id: i64) -> Result<Vec<(i64, u8)>, StoreError> {
        let rows = leadhound_db::list_scored_relevance(&self.pool, run_id).await?;
        Ok(rows
            .into_iter()
            .map(|(id, relevance)| (id, u8::try_from(relevance.clamp(0, 100)).unwrap_or(0)))
            .collect())
    }

    async fn delete_leads(&self, run_id: i64, ids: &[i64]) -> Result<u64, StoreError> {
        Ok(leadhound_db::delete_leads(&self.pool, run_id, ids).await?)
    }

    async fn delete_unscored(&self, run_id: i64) -> Result<u64, StoreError> {
        Ok(leadhound_db::delete_unscored_leads(&self.pool, run_id).await?)
    }

    async fn step(
        &self,
        run_id: i64,
        name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let row = leadhound_db::get_run_step(&self.pool, run_id, name).await?;
        Ok(row.map(|r| r.result))
    }

    async fn steps_with_prefix(
        &self,
        run_id: i64,
        prefix: &str,
    ) -> Result<Vec<StepEntry>, StoreError> {
        let rows = leadhound_db::list_run_steps(&self.pool, run_id, prefix).await?;
        Ok(rows
            .into_iter()
            .map(|r| StepEntry {
                name: r.step_name,
                result: r.result,
            })
            .collect())
    }

    async fn record_step(
        &self,
        run_id: i64,
        name: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        leadhound_db::record_run_step(&self.pool, run_id, name, result).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row() -> RunRow {
        RunRow {
            id: 3,
            public_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            website_url: "https://acme.test".to_owned(),
            description: "Field service scheduling".to_owned(),
            keywords: vec!["scheduling app".to_owned()],
            competitors: vec![],
            platform: "hackernews".to_owned(),
            lead_tier: None,
            time_window: Some("month".to_owned()),
            max_age_days: 30,
            target_count: 30,
            posts_per_keyword_limit: 50,
            recipient_email: None,
            status: "ANALYZING_LEADS".to_owned(),
            lead_count: 0,
            warnings: serde_json::json!(["reddit search failed", 7]),
            error_message: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    #[test]
    fn maps_row_to_record() {
        let record = run_record_from_row(row()).unwrap();

        assert_eq!(record.status, RunStatus::AnalyzingLeads);
        assert_eq!(record.platform, Platform::HackerNews);
        assert_eq!(record.params.target_count, 30);
        assert_eq!(record.warnings, vec!["reddit search failed".to_owned()]);
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut bad = row();
        bad.status = "RUNNING".to_owned();
        assert!(matches!(
            run_record_from_row(bad),
            Err(StoreError::Corrupt { id: 3, .. })
        ));
    }

    #[test]
    fn both_tier_and_window_is_corrupt() {
        let mut bad = row();
        bad.lead_tier = Some("starter".to_owned());
        assert!(run_record_from_row(bad).is_err());
    }
}
