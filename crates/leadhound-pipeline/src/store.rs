//! Persistence seam between the orchestrator and the database.

use async_trait::async_trait;
use leadhound_core::{Platform, RunParameters, RunStatus};
use leadhound_db::{InsertOutcome, LeadAnnotation, NewLead};
use uuid::Uuid;

use crate::error::StoreError;

/// A run as the orchestrator sees it.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub public_id: Uuid,
    pub website_url: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub competitors: Vec<String>,
    pub platform: Platform,
    pub params: RunParameters,
    pub recipient_email: Option<String>,
    pub status: RunStatus,
    pub lead_count: u32,
    pub warnings: Vec<String>,
}

/// A persisted lead still waiting for its classifier verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLead {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub community: Option<String>,
}

/// Answer to [`RunStore::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Claimed,
    /// Another executor already holds the run.
    RunBusy,
    /// The global bound on runs in flight is reached.
    AtCapacity,
}

/// A completed entry of the step log.
#[derive(Debug, Clone)]
pub struct StepEntry {
    pub name: String,
    pub result: serde_json::Value,
}

/// Everything the orchestrator reads or writes.
///
/// Status changes must be guarded on the expected current status so a stale
/// caller can never move a run backwards. `insert_lead` must report a
/// duplicate `(source, external_id)` as [`InsertOutcome::AlreadyExists`].
/// `apply_classification` must annotate, delete and record the step
/// atomically.
///
/// Claims are shared by every process using the same store: at most one
/// executor holds a run, and no more claims are granted than the configured
/// global bound.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load_run(&self, public_id: Uuid) -> Result<RunRecord, StoreError>;

    /// Claims exclusive execution of the run without waiting.
    async fn try_claim(&self, run_id: i64) -> Result<ClaimStatus, StoreError>;

    /// Releases a claim taken by this store. Releasing nothing is a no-op.
    async fn release_claim(&self, run_id: i64) -> Result<(), StoreError>;

    async fn transition(
        &self,
        run_id: i64,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), StoreError>;

    /// Moves a `QUEUED` run to `FAILED`.
    async fn fail(&self, run_id: i64, reason: &str) -> Result<(), StoreError>;

    async fn complete(
        &self,
        run_id: i64,
        from: RunStatus,
        lead_count: u32,
        warnings: &[String],
    ) -> Result<(), StoreError>;

    /// `(source, external_id)` of every lead already persisted for the run.
    async fn persisted_keys(&self, run_id: i64) -> Result<Vec<(String, String)>, StoreError>;

    async fn insert_lead(&self, run_id: i64, lead: &NewLead)
        -> Result<InsertOutcome, StoreError>;

    async fn count_leads(&self, run_id: i64) -> Result<u32, StoreError>;

    /// Unscored leads in fetch order.
    async fn unscored_leads(&self, run_id: i64) -> Result<Vec<PendingLead>, StoreError>;

    async fn apply_classification(
        &self,
        run_id: i64,
        step: &str,
        annotations: &[LeadAnnotation],
        discard_ids: &[i64],
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// `(lead id, relevance)` for every scored lead, in fetch order.
    async fn scored_relevance(&self, run_id: i64) -> Result<Vec<(i64, u8)>, StoreError>;

    async fn delete_leads(&self, run_id: i64, ids: &[i64]) -> Result<u64, StoreError>;

    async fn delete_unscored(&self, run_id: i64) -> Result<u64, StoreError>;

    async fn step(&self, run_id: i64, name: &str)
        -> Result<Option<serde_json::Value>, StoreError>;

    /// Recorded steps whose name starts with `prefix`, in recording order.
    async fn steps_with_prefix(
        &self,
        run_id: i64,
        prefix: &str,
    ) -> Result<Vec<StepEntry>, StoreError>;

    /// Records a step. Recording an existing step is a no-op.
    async fn record_step(
        &self,
        run_id: i64,
        name: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;
}
