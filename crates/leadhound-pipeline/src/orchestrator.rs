//! Run orchestrator: drives one run through its status machine.
//!
//! Every phase is a named step in the run's step log (`save:<n>` per query,
//! `analyze:<first lead id>` per batch, `guarantee`, `notify`). A step that is
//! already recorded is skipped, so executing the same run again after a crash
//! resumes where it stopped without applying any effect twice.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use leadhound_classifier::{
    Classifier, ClassifyContext, ClassifyItem, Verdict, BATCH_SIZE, MIN_RELEVANCE_SCORE,
};
use leadhound_core::{AppConfig, RunStatus};
use leadhound_db::{InsertOutcome, LeadAnnotation};
use leadhound_sources::{fetch, ConnectorRegistry, SearchOptions, SearchSort};
use serde_json::json;
use uuid::Uuid;

use crate::error::{PipelineError, StoreError};
use crate::guarantee::select_excess;
use crate::ledger::DedupLedger;
use crate::notify::{Notification, NotificationSink};
use crate::queries::build_search_queries;
use crate::retry::{retry_step, RetryPolicy};
use crate::store::{ClaimStatus, PendingLead, RunRecord, RunStore, StepEntry};

const SAVE_STEP_PREFIX: &str = "save:";
const ANALYZE_STEP_PREFIX: &str = "analyze:";
const GUARANTEE_STEP: &str = "guarantee";
const NOTIFY_STEP: &str = "notify";

pub const NO_QUERIES_REASON: &str = "run has no keywords or competitors to search for";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Base of the dashboard link sent in delivery notifications.
    pub dashboard_url: String,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: config.step_max_retries,
                backoff_base_ms: config.step_backoff_base_ms,
            },
            dashboard_url: config.dashboard_url.clone(),
        }
    }
}

/// Final state reported by [`Orchestrator::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub lead_count: u32,
    pub warnings: Vec<String>,
}

pub struct Orchestrator {
    store: Arc<dyn RunStore>,
    connectors: ConnectorRegistry,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn NotificationSink>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        connectors: ConnectorRegistry,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn NotificationSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            connectors,
            classifier,
            notifier,
            config,
        }
    }

    /// Executes (or resumes) a run until it reaches a terminal status.
    ///
    /// Connector, classifier and notification failures are recovered inside
    /// their step and reported as warnings. A run without any search query is
    /// marked `FAILED`; everything else ends `COMPLETED`.
    ///
    /// The run is claimed through the store before any effect, and the claim
    /// is released whatever the result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotRunnable`] for a run still awaiting
    /// payment, [`PipelineError::AlreadyRunning`] or
    /// [`PipelineError::AtCapacity`] when the claim is refused, or
    /// [`PipelineError::Store`] when persistence keeps failing after retries.
    /// In the latter cases the run keeps its status and a later call resumes
    /// it.
    pub async fn execute(&self, public_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let run = self
            .store_op("load", || self.store.load_run(public_id))
            .await?;

        match run.status {
            RunStatus::PendingPayment => {
                return Err(PipelineError::NotRunnable {
                    id: public_id,
                    status: run.status,
                });
            }
            RunStatus::Failed => {
                tracing::info!(run_id = %public_id, "run already failed, nothing to do");
                return Ok(outcome(&run, run.status, run.lead_count, run.warnings.clone()));
            }
            _ => {}
        }

        match self
            .store_op("claim", || self.store.try_claim(run.id))
            .await?
        {
            ClaimStatus::Claimed => {}
            ClaimStatus::RunBusy => return Err(PipelineError::AlreadyRunning { id: public_id }),
            ClaimStatus::AtCapacity => return Err(PipelineError::AtCapacity { id: public_id }),
        }

        let result = self.execute_claimed(public_id).await;
        if let Err(e) = self.store.release_claim(run.id).await {
            tracing::warn!(run_id = %public_id, error = %e, "failed to release execution claim");
        }
        result
    }

    async fn execute_claimed(&self, public_id: Uuid) -> Result<RunOutcome, PipelineError> {
        // Another executor may have moved the run on before the claim.
        let run = self
            .store_op("load", || self.store.load_run(public_id))
            .await?;

        match run.status {
            RunStatus::PendingPayment => {
                return Err(PipelineError::NotRunnable {
                    id: public_id,
                    status: run.status,
                });
            }
            RunStatus::Failed => {
                return Ok(outcome(&run, run.status, run.lead_count, run.warnings.clone()));
            }
            RunStatus::Completed => {
                // A crash between completion and notification leaves the
                // notify step unrecorded.
                self.notify_step(&run, run.lead_count).await?;
                return Ok(outcome(&run, run.status, run.lead_count, run.warnings.clone()));
            }
            RunStatus::Queued | RunStatus::FetchingLeads | RunStatus::AnalyzingLeads => {}
        }

        let mut status = run.status;

        if status == RunStatus::Queued {
            if build_search_queries(&run.keywords, &run.competitors).is_empty() {
                tracing::warn!(run_id = %public_id, reason = NO_QUERIES_REASON, "run failed validation");
                self.store_op("fail", || self.store.fail(run.id, NO_QUERIES_REASON))
                    .await?;
                return Ok(outcome(&run, RunStatus::Failed, 0, Vec::new()));
            }
            self.advance(&run, RunStatus::Queued, RunStatus::FetchingLeads)
                .await?;
            status = RunStatus::FetchingLeads;
        }

        if status == RunStatus::FetchingLeads {
            self.fetch_phase(&run).await?;

            let persisted = self
                .store_op("count", || self.store.count_leads(run.id))
                .await?;
            if persisted == 0 {
                let warnings = self.collected_warnings(run.id).await?;
                self.store_op("complete", || {
                    self.store
                        .complete(run.id, RunStatus::FetchingLeads, 0, &warnings)
                })
                .await?;
                tracing::info!(
                    run_id = %public_id,
                    warnings = warnings.len(),
                    "no candidates survived, run completed empty"
                );
                return Ok(outcome(&run, RunStatus::Completed, 0, warnings));
            }
            self.advance(&run, RunStatus::FetchingLeads, RunStatus::AnalyzingLeads)
                .await?;
        }

        self.analyze_phase(&run).await?;
        let lead_count = self.guarantee_step(&run).await?;
        let warnings = self.collected_warnings(run.id).await?;

        self.store_op("complete", || {
            self.store
                .complete(run.id, RunStatus::AnalyzingLeads, lead_count, &warnings)
        })
        .await?;
        tracing::info!(
            run_id = %public_id,
            lead_count,
            target_count = run.params.target_count,
            warnings = warnings.len(),
            "run completed"
        );

        self.notify_step(&run, lead_count).await?;

        Ok(outcome(&run, RunStatus::Completed, lead_count, warnings))
    }

    /// One `save:<n>` step per query, in order. Connector failures become the
    /// step's warning.
    async fn fetch_phase(&self, run: &RunRecord) -> Result<(), StoreError> {
        let queries = build_search_queries(&run.keywords, &run.competitors);
        let connector = self.connectors.get(run.platform);
        let source = run.platform.as_str();
        let options = SearchOptions {
            limit: run.params.posts_per_keyword_limit,
            max_age_days: run.params.max_age_days,
            sort: SearchSort::Relevance,
        };

        let persisted = self
            .store_op("persisted keys", || self.store.persisted_keys(run.id))
            .await?;
        let mut ledger = DedupLedger::new(persisted);

        for (idx, query) in queries.iter().enumerate() {
            let step = format!("{SAVE_STEP_PREFIX}{idx}");
            if self
                .store_op(&step, || self.store.step(run.id, &step))
                .await?
                .is_some()
            {
                tracing::debug!(run_id = %run.public_id, step = %step, "query already saved, skipping");
                continue;
            }

            let fetched = fetch(connector.as_ref(), query, &options).await;
            let mut saved = 0_u32;
            let mut rejected = 0_u32;

            for post in &fetched.posts {
                match ledger.admit(source, post) {
                    Ok(lead) => {
                        let inserted = self
                            .store_op(&step, || self.store.insert_lead(run.id, &lead))
                            .await?;
                        match inserted {
                            InsertOutcome::Inserted(_) => saved += 1,
                            InsertOutcome::AlreadyExists => {
                                tracing::debug!(
                                    external_id = %lead.external_id,
                                    "lead already persisted"
                                );
                            }
                        }
                    }
                    Err(reason) => {
                        rejected += 1;
                        tracing::debug!(
                            external_id = %post.external_id,
                            reason = reason.as_str(),
                            "candidate dropped"
                        );
                    }
                }
            }

            let result = json!({
                "query": query,
                "fetched": fetched.posts.len(),
                "saved": saved,
                "rejected": rejected,
                "warning": fetched.error,
            });
            self.store_op(&step, || self.store.record_step(run.id, &step, &result))
                .await?;
            tracing::info!(
                run_id = %run.public_id,
                query = %query,
                fetched = fetched.posts.len(),
                saved,
                rejected,
                "query processed"
            );
        }

        tracing::info!(
            run_id = %run.public_id,
            queries = queries.len(),
            admitted = ledger.admitted(),
            "fetch phase finished"
        );
        Ok(())
    }

    /// Classifies every unscored lead not covered by a recorded batch.
    async fn analyze_phase(&self, run: &RunRecord) -> Result<(), StoreError> {
        let recorded = self
            .store_op("analyze steps", || {
                self.store.steps_with_prefix(run.id, ANALYZE_STEP_PREFIX)
            })
            .await?;
        let covered: HashSet<i64> = recorded
            .iter()
            .flat_map(|entry| lead_ids_of(&entry.result))
            .collect();

        let pending: Vec<PendingLead> = self
            .store_op("unscored", || self.store.unscored_leads(run.id))
            .await?
            .into_iter()
            .filter(|lead| !covered.contains(&lead.id))
            .collect();

        let context = ClassifyContext {
            description: run.description.clone(),
            keywords: run.keywords.clone(),
            website_url: run.website_url.clone(),
        };

        tracing::info!(
            run_id = %run.public_id,
            pending = pending.len(),
            batches = pending.len().div_ceil(BATCH_SIZE),
            "classifying leads"
        );

        for chunk in pending.chunks(BATCH_SIZE) {
            let Some(first) = chunk.first() else {
                continue;
            };
            let step = format!("{ANALYZE_STEP_PREFIX}{}", first.id);
            self.classify_batch(run, &step, chunk, &context).await?;
        }

        Ok(())
    }

    async fn classify_batch(
        &self,
        run: &RunRecord,
        step: &str,
        chunk: &[PendingLead],
        context: &ClassifyContext,
    ) -> Result<(), StoreError> {
        let lead_ids: Vec<i64> = chunk.iter().map(|lead| lead.id).collect();
        let items: Vec<ClassifyItem> = chunk
            .iter()
            .map(|lead| ClassifyItem {
                external_id: lead.external_id.clone(),
                title: lead.title.clone(),
                content: lead.content.clone(),
                community: lead.community.clone(),
            })
            .collect();

        let verdicts = retry_step(self.config.retry, step, |_| true, || {
            self.classifier.classify(&items, context)
        })
        .await;

        match verdicts {
            Ok(verdicts) => {
                let (annotations, discards) = partition_verdicts(chunk, &verdicts);
                let result = json!({
                    "lead_ids": lead_ids,
                    "kept": annotations.len(),
                    "discarded": discards.len(),
                });
                self.store_op(step, || {
                    self.store
                        .apply_classification(run.id, step, &annotations, &discards, &result)
                })
                .await?;
                tracing::info!(
                    run_id = %run.public_id,
                    batch = step,
                    kept = annotations.len(),
                    discarded = discards.len(),
                    "batch classified"
                );
            }
            Err(e) => {
                let warning = format!("classification of batch {step} failed: {e}");
                tracing::warn!(
                    run_id = %run.public_id,
                    batch = step,
                    error = %e,
                    "classifier batch failed, leads stay unscored"
                );
                let result = json!({
                    "lead_ids": lead_ids,
                    "failed": true,
                    "warning": warning,
                });
                self.store_op(step, || self.store.record_step(run.id, step, &result))
                    .await?;
            }
        }

        Ok(())
    }

    /// Drops leftovers without a score, then trims to the target count.
    /// Returns the number of leads delivered.
    async fn guarantee_step(&self, run: &RunRecord) -> Result<u32, StoreError> {
        let already = self
            .store_op(GUARANTEE_STEP, || self.store.step(run.id, GUARANTEE_STEP))
            .await?;
        if already.is_some() {
            return self
                .store_op(GUARANTEE_STEP, || self.store.count_leads(run.id))
                .await;
        }

        let unscored_removed = self
            .store_op(GUARANTEE_STEP, || self.store.delete_unscored(run.id))
            .await?;
        let scored = self
            .store_op(GUARANTEE_STEP, || self.store.scored_relevance(run.id))
            .await?;
        let excess = select_excess(&scored, run.params.target_count);
        let trimmed = self
            .store_op(GUARANTEE_STEP, || self.store.delete_leads(run.id, &excess))
            .await?;
        let lead_count = self
            .store_op(GUARANTEE_STEP, || self.store.count_leads(run.id))
            .await?;

        let result = json!({
            "unscored_removed": unscored_removed,
            "trimmed": trimmed,
            "lead_count": lead_count,
        });
        self.store_op(GUARANTEE_STEP, || {
            self.store.record_step(run.id, GUARANTEE_STEP, &result)
        })
        .await?;

        if lead_count < run.params.target_count {
            tracing::info!(
                run_id = %run.public_id,
                lead_count,
                target_count = run.params.target_count,
                "delivering fewer leads than targeted"
            );
        }

        Ok(lead_count)
    }

    /// Sends the delivery notification at most once per run.
    async fn notify_step(&self, run: &RunRecord, lead_count: u32) -> Result<(), StoreError> {
        if lead_count == 0 {
            return Ok(());
        }
        let Some(recipient) = run
            .recipient_email
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        else {
            tracing::debug!(run_id = %run.public_id, "no recipient, skipping notification");
            return Ok(());
        };

        let already = self
            .store_op(NOTIFY_STEP, || self.store.step(run.id, NOTIFY_STEP))
            .await?;
        if already.is_some() {
            return Ok(());
        }

        let notification = Notification {
            recipient: recipient.to_owned(),
            lead_count,
            target_count: run.params.target_count,
            platform_label: run.platform.label().to_owned(),
            dashboard_url: format!(
                "{}/runs/{}",
                self.config.dashboard_url.trim_end_matches('/'),
                run.public_id
            ),
        };

        let result = match self.notifier.send(&notification).await {
            Ok(()) => json!({ "sent": true }),
            Err(e) => {
                tracing::warn!(
                    run_id = %run.public_id,
                    error = %e,
                    "delivery notification failed"
                );
                json!({ "sent": false, "error": e.to_string() })
            }
        };
        self.store_op(NOTIFY_STEP, || {
            self.store.record_step(run.id, NOTIFY_STEP, &result)
        })
        .await
    }

    async fn advance(
        &self,
        run: &RunRecord,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), StoreError> {
        self.store_op("transition", || self.store.transition(run.id, from, to))
            .await?;
        tracing::info!(run_id = %run.public_id, %from, %to, "run status changed");
        Ok(())
    }

    /// Warnings recorded by save steps (in query order) then analyze steps
    /// (in batch order).
    async fn collected_warnings(&self, run_id: i64) -> Result<Vec<String>, StoreError> {
        let mut saves = self
            .store_op("warnings", || {
                self.store.steps_with_prefix(run_id, SAVE_STEP_PREFIX)
            })
            .await?;
        let mut analyses = self
            .store_op("warnings", || {
                self.store.steps_with_prefix(run_id, ANALYZE_STEP_PREFIX)
            })
            .await?;
        saves.sort_by_key(|entry| step_ordinal(entry, SAVE_STEP_PREFIX));
        analyses.sort_by_key(|entry| step_ordinal(entry, ANALYZE_STEP_PREFIX));

        Ok(saves
            .iter()
            .chain(analyses.iter())
            .filter_map(|entry| entry.result.get("warning").and_then(|w| w.as_str()))
            .map(str::to_owned)
            .collect())
    }

    async fn store_op<T, F, Fut>(&self, step: &str, operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        retry_step(self.config.retry, step, StoreError::is_transient, operation).await
    }
}

fn outcome(run: &RunRecord, status: RunStatus, lead_count: u32, warnings: Vec<String>) -> RunOutcome {
    RunOutcome {
        run_id: run.public_id,
        status,
        lead_count,
        warnings,
    }
}

fn lead_ids_of(result: &serde_json::Value) -> Vec<i64> {
    result
        .get("lead_ids")
        .and_then(|ids| ids.as_array())
        .map(|ids| ids.iter().filter_map(serde_json::Value::as_i64).collect())
        .unwrap_or_default()
}

fn step_ordinal(entry: &StepEntry, prefix: &str) -> i64 {
    entry
        .name
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .unwrap_or(i64::MAX)
}

/// Splits a batch into leads to annotate (relevance at or above the floor)
/// and leads to delete. A lead the classifier did not return a verdict for
/// counts as not qualified.
fn partition_verdicts(
    chunk: &[PendingLead],
    verdicts: &[Verdict],
) -> (Vec<LeadAnnotation>, Vec<i64>) {
    let mut annotations = Vec::new();
    let mut discards = Vec::new();

    for lead in chunk {
        match verdicts.iter().find(|v| v.external_id == lead.external_id) {
            Some(verdict) if verdict.relevance >= MIN_RELEVANCE_SCORE => {
                annotations.push(LeadAnnotation {
                    lead_id: lead.id,
                    intent: verdict.intent.as_str().to_owned(),
                    relevance: i16::from(verdict.relevance),
                    reason: verdict.reason.clone(),
                });
            }
            _ => discards.push(lead.id),
        }
    }

    (annotations, discards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadhound_core::Intent;

    fn pending(id: i64) -> PendingLead {
        PendingLead {
            id,
            external_id: format!("t3_{id}"),
            title: "title".to_owned(),
            content: String::new(),
            community: None,
        }
    }

    fn verdict(id: i64, relevance: u8) -> Verdict {
        Verdict {
            external_id: format!("t3_{id}"),
            intent: Intent::Recommendation,
            relevance,
            reason: "asks for a tool".to_owned(),
        }
    }

    #[test]
    fn floor_is_inclusive() {
        let chunk = vec![pending(1), pending(2), pending(3), pending(4)];
        let verdicts = vec![verdict(1, 60), verdict(2, 59), verdict(3, 95)];

        let (annotations, discards) = partition_verdicts(&chunk, &verdicts);

        let kept: Vec<_> = annotations.iter().map(|a| a.lead_id).collect();
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(discards, vec![2, 4]);
        assert_eq!(annotations[0].intent, "recommendation");
    }

    #[test]
    fn lead_ids_are_read_back_from_step_results() {
        let result = json!({ "lead_ids": [4, 5, 6], "kept": 1 });
        assert_eq!(lead_ids_of(&result), vec![4, 5, 6]);
        assert!(lead_ids_of(&json!({})).is_empty());
    }

    #[test]
    fn step_ordinals_sort_numerically() {
        let entry = |name: &str| StepEntry {
            name: name.to_owned(),
            result: json!({}),
        };
        let mut entries = vec![entry("save:10"), entry("save:2"), entry("save:0")];
        entries.sort_by_key(|e| step_ordinal(e, SAVE_STEP_PREFIX));
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["save:0", "save:2", "save:10"]);
    }
}
