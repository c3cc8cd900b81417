use leadhound_core::RunStatus;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the persistence seam.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error(transparent)]
    Db(#[from] leadhound_db::DbError),

    /// A stored row could not be mapped back to domain types.
    #[error("corrupt run row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

impl StoreError {
    /// Connection and query failures may clear up; everything else will not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Db(leadhound_db::DbError::Sqlx(_)))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("run {id} is {status} and cannot be executed yet")]
    NotRunnable { id: Uuid, status: RunStatus },

    #[error("run {id} is already being executed elsewhere")]
    AlreadyRunning { id: Uuid },

    #[error("run {id} not started: every execution slot is taken")]
    AtCapacity { id: Uuid },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification service returned {status}")]
    Rejected { status: u16 },
}

/// Failures while wiring the orchestrator from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("LEADHOUND_LLM_API_KEY is required to classify leads")]
    MissingLlmApiKey,

    #[error(transparent)]
    Classifier(#[from] leadhound_classifier::ClassifierError),

    #[error(transparent)]
    Sources(#[from] leadhound_sources::SourceError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}
