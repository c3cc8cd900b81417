//! Run execution for LeadHound.
//!
//! A run moves `QUEUED -> FETCHING_LEADS -> ANALYZING_LEADS -> COMPLETED`
//! (or `QUEUED -> FAILED`). [`Orchestrator`] drives one run through those
//! phases as a sequence of recorded steps; [`RunDispatcher`] executes runs in
//! the background with bounded concurrency.

pub mod dispatcher;
pub mod error;
pub mod guarantee;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod pg_store;
pub mod queries;
mod retry;
pub mod setup;
pub mod store;

pub use dispatcher::RunDispatcher;
pub use error::{NotifyError, PipelineError, SetupError, StoreError};
pub use guarantee::select_excess;
pub use ledger::{DedupLedger, Rejection};
pub use notify::{LogNotificationSink, Notification, NotificationSink, WebhookNotificationSink};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome, NO_QUERIES_REASON};
pub use pg_store::{run_record_from_row, PgRunStore};
pub use queries::build_search_queries;
pub use retry::RetryPolicy;
pub use setup::{classifier_from_config, notifier_from_config, orchestrator_from_config};
pub use store::{ClaimStatus, PendingLead, RunRecord, RunStore, StepEntry};
