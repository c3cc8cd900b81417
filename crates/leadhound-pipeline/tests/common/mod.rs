//! In-memory collaborators for orchestrator tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use leadhound_classifier::{ClassifierError, ClassifyContext, ClassifyItem, Classifier, Verdict};
use leadhound_core::{Intent, NormalizedPost, Platform, RunParameters, RunStatus};
use leadhound_db::{DbError, InsertOutcome, LeadAnnotation, NewLead};
use leadhound_pipeline::{
    ClaimStatus, Notification, NotificationSink, NotifyError, Orchestrator, OrchestratorConfig,
    PendingLead, RetryPolicy, RunRecord, RunStore, StepEntry, StoreError,
};
use leadhound_sources::{ConnectorRegistry, SearchConnector, SearchOptions, SourceError};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredLead {
    pub id: i64,
    pub run_id: i64,
    pub lead: NewLead,
    pub intent: Option<String>,
    pub relevance: Option<u8>,
}

#[derive(Default)]
struct State {
    runs: HashMap<i64, RunRecord>,
    by_public_id: HashMap<Uuid, i64>,
    history: HashMap<i64, Vec<RunStatus>>,
    leads: Vec<StoredLead>,
    steps: Vec<(i64, String, Value)>,
    next_run_id: i64,
    next_lead_id: i64,
    failing: HashSet<&'static str>,
    hide_persisted_keys: bool,
    claimed: HashSet<i64>,
    held_elsewhere: HashSet<i64>,
    at_capacity: bool,
    releases: usize,
}

/// A [`RunStore`] that keeps everything in memory and records every status a
/// run passes through.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

pub struct RunSpec {
    pub keywords: Vec<&'static str>,
    pub competitors: Vec<&'static str>,
    pub platform: Platform,
    pub target_count: u32,
    pub recipient: Option<&'static str>,
    pub status: RunStatus,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            keywords: vec!["crm for agencies"],
            competitors: vec![],
            platform: Platform::Reddit,
            target_count: 20,
            recipient: Some("founder@acme.test"),
            status: RunStatus::Queued,
        }
    }
}

fn transient() -> StoreError {
    StoreError::Db(DbError::Sqlx(sqlx::Error::PoolTimedOut))
}

impl MemoryStore {
    pub fn add_run(&self, spec: RunSpec) -> Uuid {
        let mut state = self.state.lock().unwrap();
        state.next_run_id += 1;
        let id = state.next_run_id;
        let public_id = Uuid::new_v4();
        state.runs.insert(
            id,
            RunRecord {
                id,
                public_id,
                website_url: "https://acme.test".to_owned(),
                description: "CRM for small agencies".to_owned(),
                keywords: spec.keywords.iter().map(|k| (*k).to_owned()).collect(),
                competitors: spec.competitors.iter().map(|c| (*c).to_owned()).collect(),
                platform: spec.platform,
                params: RunParameters {
                    max_age_days: 30,
                    target_count: spec.target_count,
                    posts_per_keyword_limit: 100,
                },
                recipient_email: spec.recipient.map(str::to_owned),
                status: spec.status,
                lead_count: 0,
                warnings: Vec::new(),
            },
        );
        state.by_public_id.insert(public_id, id);
        state.history.insert(id, vec![spec.status]);
        public_id
    }

    /// Makes the named operation fail with a transient error until cleared.
    pub fn fail_on(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    /// Pretends the persisted-key snapshot was taken before another writer
    /// inserted its leads.
    pub fn hide_persisted_keys(&self) {
        self.state.lock().unwrap().hide_persisted_keys = true;
    }

    pub fn seed_lead(&self, public_id: Uuid, source: &str, external_id: &str) {
        let mut state = self.state.lock().unwrap();
        let run_id = state.by_public_id[&public_id];
        state.next_lead_id += 1;
        let id = state.next_lead_id;
        state.leads.push(StoredLead {
            id,
            run_id,
            lead: new_lead(source, external_id),
            intent: None,
            relevance: None,
        });
    }

    pub fn run(&self, public_id: Uuid) -> RunRecord {
        let state = self.state.lock().unwrap();
        state.runs[&state.by_public_id[&public_id]].clone()
    }

    pub fn history(&self, public_id: Uuid) -> Vec<RunStatus> {
        let state = self.state.lock().unwrap();
        state.history[&state.by_public_id[&public_id]].clone()
    }

    pub fn leads(&self, public_id: Uuid) -> Vec<StoredLead> {
        let state = self.state.lock().unwrap();
        let run_id = state.by_public_id[&public_id];
        state
            .leads
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn step_result(&self, public_id: Uuid, name: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let run_id = state.by_public_id[&public_id];
        state
            .steps
            .iter()
            .find(|(r, n, _)| *r == run_id && n == name)
            .map(|(_, _, v)| v.clone())
    }

    /// Pretends another process holds the run's execution claim.
    pub fn hold_claim(&self, public_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        let id = state.by_public_id[&public_id];
        state.held_elsewhere.insert(id);
    }

    pub fn release_held_claim(&self, public_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        let id = state.by_public_id[&public_id];
        state.held_elsewhere.remove(&id);
    }

    /// Refuses every new claim as if all execution slots were taken.
    pub fn set_at_capacity(&self, at_capacity: bool) {
        self.state.lock().unwrap().at_capacity = at_capacity;
    }

    pub fn claims_held(&self) -> usize {
        self.state.lock().unwrap().claimed.len()
    }

    pub fn releases(&self) -> usize {
        self.state.lock().unwrap().releases
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.state.lock().unwrap().failing.contains(operation) {
            return Err(transient());
        }
        Ok(())
    }

    fn set_status(
        state: &mut State,
        run_id: i64,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), StoreError> {
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::Db(DbError::NotFound))?;
        if run.status != from || !from.can_transition_to(to) {
            return Err(StoreError::Db(DbError::InvalidRunTransition {
                id: run_id,
                from: run.status,
                to,
            }));
        }
        run.status = to;
        state.history.entry(run_id).or_default().push(to);
        Ok(())
    }
}

pub fn new_lead(source: &str, external_id: &str) -> NewLead {
    NewLead {
        source: source.to_owned(),
        external_id: external_id.to_owned(),
        title: "Seeded lead".to_owned(),
        content: String::new(),
        author: "buyer".to_owned(),
        url: format!("https://reddit.test/{external_id}"),
        community: Some("smallbusiness".to_owned()),
        score: 1,
        num_comments: 0,
        published_at: None,
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn load_run(&self, public_id: Uuid) -> Result<RunRecord, StoreError> {
        self.check("load")?;
        let state = self.state.lock().unwrap();
        state
            .by_public_id
            .get(&public_id)
            .map(|id| state.runs[id].clone())
            .ok_or(StoreError::RunNotFound(public_id))
    }

    async fn transition(
        &self,
        run_id: i64,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), StoreError> {
        self.check("transition")?;
        let mut state = self.state.lock().unwrap();
        Self::set_status(&mut state, run_id, from, to)
    }

    async fn fail(&self, run_id: i64, _reason: &str) -> Result<(), StoreError> {
        self.check("fail")?;
        let mut state = self.state.lock().unwrap();
        Self::set_status(&mut state, run_id, RunStatus::Queued, RunStatus::Failed)
    }

    async fn complete(
        &self,
        run_id: i64,
        from: RunStatus,
        lead_count: u32,
        warnings: &[String],
    ) -> Result<(), StoreError> {
        self.check("complete")?;
        let mut state = self.state.lock().unwrap();
        Self::set_status(&mut state, run_id, from, RunStatus::Completed)?;
        let run = state.runs.get_mut(&run_id).ok_or(StoreError::Db(DbError::NotFound))?;
        run.lead_count = lead_count;
        run.warnings = warnings.to_vec();
        Ok(())
    }

    async fn persisted_keys(&self, run_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.hide_persisted_keys {
            return Ok(Vec::new());
        }
        Ok(state
            .leads
            .iter()
            .filter(|l| l.run_id == run_id)
            .map(|l| (l.lead.source.clone(), l.lead.external_id.clone()))
            .collect())
    }

    async fn insert_lead(
        &self,
        run_id: i64,
        lead: &NewLead,
    ) -> Result<InsertOutcome, StoreError> {
        self.check("insert")?;
        let mut state = self.state.lock().unwrap();
        let exists = state.leads.iter().any(|l| {
            l.run_id == run_id
                && l.lead.source == lead.source
                && l.lead.external_id == lead.external_id
        });
        if exists {
            return Ok(InsertOutcome::AlreadyExists);
        }
        state.next_lead_id += 1;
        let id = state.next_lead_id;
        state.leads.push(StoredLead {
            id,
            run_id,
            lead: lead.clone(),
            intent: None,
            relevance: None,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn count_leads(&self, run_id: i64) -> Result<u32, StoreError> {
        let state = self.state.lock().unwrap();
        let count = state.leads.iter().filter(|l| l.run_id == run_id).count();
        Ok(u32::try_from(count).unwrap())
    }

    async fn unscored_leads(&self, run_id: i64) -> Result<Vec<PendingLead>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .leads
            .iter()
            .filter(|l| l.run_id == run_id && l.relevance.is_none())
            .map(|l| PendingLead {
                id: l.id,
                external_id: l.lead.external_id.clone(),
                title: l.lead.title.clone(),
                content: l.lead.content.clone(),
                community: l.lead.community.clone(),
            })
            .collect())
    }

    async fn apply_classification(
        &self,
        run_id: i64,
        step: &str,
        annotations: &[LeadAnnotation],
        discard_ids: &[i64],
        result: &Value,
    ) -> Result<(), StoreError> {
        self.check("classify")?;
        let mut state = self.state.lock().unwrap();
        for annotation in annotations {
            if let Some(lead) = state
                .leads
                .iter_mut()
                .find(|l| l.run_id == run_id && l.id == annotation.lead_id)
            {
                lead.intent = Some(annotation.intent.clone());
                lead.relevance = Some(u8::try_from(annotation.relevance).unwrap());
            }
        }
        state
            .leads
            .retain(|l| !(l.run_id == run_id && discard_ids.contains(&l.id)));
        if !state.steps.iter().any(|(r, n, _)| *r == run_id && n == step) {
            state.steps.push((run_id, step.to_owned(), result.clone()));
        }
        Ok(())
    }

    async fn scored_relevance(&self, run_id: i64) -> Result<Vec<(i64, u8)>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .leads
            .iter()
            .filter(|l| l.run_id == run_id)
            .filter_map(|l| l.relevance.map(|r| (l.id, r)))
            .collect())
    }

    async fn delete_leads(&self, run_id: i64, ids: &[i64]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.leads.len();
        state
            .leads
            .retain(|l| !(l.run_id == run_id && ids.contains(&l.id)));
        Ok((before - state.leads.len()) as u64)
    }

    async fn delete_unscored(&self, run_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.leads.len();
        state
            .leads
            .retain(|l| !(l.run_id == run_id && l.relevance.is_none()));
        Ok((before - state.leads.len()) as u64)
    }

    async fn step(&self, run_id: i64, name: &str) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .steps
            .iter()
            .find(|(r, n, _)| *r == run_id && n == name)
            .map(|(_, _, v)| v.clone()))
    }

    async fn steps_with_prefix(
        &self,
        run_id: i64,
        prefix: &str,
    ) -> Result<Vec<StepEntry>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .steps
            .iter()
            .filter(|(r, n, _)| *r == run_id && n.starts_with(prefix))
            .map(|(_, n, v)| StepEntry {
                name: n.clone(),
                result: v.clone(),
            })
            .collect())
    }

    async fn record_step(&self, run_id: i64, name: &str, result: &Value) -> Result<(), StoreError> {
        self.check("record")?;
        let mut state = self.state.lock().unwrap();
        if !state.steps.iter().any(|(r, n, _)| *r == run_id && n == name) {
            state.steps.push((run_id, name.to_owned(), result.clone()));
        }
        Ok(())
    }

    async fn try_claim(&self, run_id: i64) -> Result<ClaimStatus, StoreError> {
        self.check("claim")?;
        let mut state = self.state.lock().unwrap();
        if state.held_elsewhere.contains(&run_id) || state.claimed.contains(&run_id) {
            return Ok(ClaimStatus::RunBusy);
        }
        if state.at_capacity {
            return Ok(ClaimStatus::AtCapacity);
        }
        state.claimed.insert(run_id);
        Ok(ClaimStatus::Claimed)
    }

    async fn release_claim(&self, run_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.claimed.remove(&run_id);
        state.releases += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Returns canned posts per query; queries listed in `failing` error out.
pub struct FakeConnector {
    platform: Platform,
    results: HashMap<String, Vec<NormalizedPost>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            results: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(mut self, query: &str, posts: Vec<NormalizedPost>) -> Self {
        self.results.insert(query.to_owned(), posts);
        self
    }

    pub fn failing_for(mut self, query: &str) -> Self {
        self.failing.insert(query.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchConnector for FakeConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        self.calls.lock().unwrap().push(query.to_owned());
        if self.failing.contains(query) {
            return Err(SourceError::UnexpectedStatus {
                platform: "reddit",
                status: 503,
            });
        }
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

pub fn post(external_id: &str) -> NormalizedPost {
    NormalizedPost {
        id: external_id.trim_start_matches("t3_").to_owned(),
        external_id: external_id.to_owned(),
        title: format!("Looking for a CRM ({external_id})"),
        content: "We are a five person agency and spreadsheets stopped working.".to_owned(),
        url: format!("https://www.reddit.com/comments/{external_id}"),
        author: "agency_owner".to_owned(),
        community: Some("smallbusiness".to_owned()),
        score: 3,
        num_comments: 2,
        created_utc: Some(Utc::now() - Duration::days(1)),
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Scores by external id (default 80). Batches containing a poisoned id fail.
#[derive(Default)]
pub struct FakeClassifier {
    relevance: HashMap<String, u8>,
    poisoned: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn with_relevance(mut self, external_id: &str, relevance: u8) -> Self {
        self.relevance.insert(external_id.to_owned(), relevance);
        self
    }

    pub fn poisoned(mut self, external_id: &str) -> Self {
        self.poisoned.insert(external_id.to_owned());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(
        &self,
        batch: &[ClassifyItem],
        _context: &ClassifyContext,
    ) -> Result<Vec<Verdict>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if batch.iter().any(|item| self.poisoned.contains(&item.external_id)) {
            return Err(ClassifierError::Malformed("model returned prose".to_owned()));
        }
        Ok(batch
            .iter()
            .map(|item| Verdict {
                external_id: item.external_id.clone(),
                intent: Intent::Recommendation,
                relevance: self.relevance.get(&item.external_id).copied().unwrap_or(80),
                reason: "asks for a recommendation".to_owned(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    reject: bool,
}

impl RecordingSink {
    pub fn rejecting() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.reject {
            return Err(NotifyError::Rejected { status: 502 });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub connector: Arc<FakeConnector>,
    pub classifier: Arc<FakeClassifier>,
    pub sink: Arc<RecordingSink>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(connector: FakeConnector, classifier: FakeClassifier, sink: RecordingSink) -> Self {
        let store = Arc::new(MemoryStore::default());
        let connector = Arc::new(connector);
        let classifier = Arc::new(classifier);
        let sink = Arc::new(sink);
        let orchestrator = Orchestrator::new(
            Arc::clone(&store) as Arc<dyn RunStore>,
            ConnectorRegistry::new().with_connector(Arc::clone(&connector) as Arc<dyn SearchConnector>),
            Arc::clone(&classifier) as Arc<dyn Classifier>,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            OrchestratorConfig {
                retry: RetryPolicy {
                    max_retries: 1,
                    backoff_base_ms: 0,
                },
                dashboard_url: "https://app.leadhound.test/".to_owned(),
            },
        );
        Self {
            store,
            connector,
            classifier,
            sink,
            orchestrator,
        }
    }
}

/// Every observed status is at or after the previous one.
pub fn assert_monotonic(history: &[RunStatus]) {
    for pair in history.windows(2) {
        assert!(
            pair[0].rank() <= pair[1].rank(),
            "status moved backwards: {history:?}"
        );
    }
}
