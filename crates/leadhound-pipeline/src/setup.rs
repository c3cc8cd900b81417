//! Builds the production orchestrator from [`AppConfig`].

use std::sync::Arc;

use leadhound_classifier::{Classifier, OpenAiClassifier};
use leadhound_core::AppConfig;
use leadhound_sources::ConnectorRegistry;
use sqlx::PgPool;

use crate::error::SetupError;
use crate::notify::{LogNotificationSink, NotificationSink, WebhookNotificationSink};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::pg_store::PgRunStore;

/// # Errors
///
/// Returns [`SetupError::MissingLlmApiKey`] when no classifier key is
/// configured, or the underlying error if an HTTP client cannot be built.
pub fn classifier_from_config(config: &AppConfig) -> Result<Arc<dyn Classifier>, SetupError> {
    let api_key = config
        .llm_api_key
        .as_deref()
        .ok_or(SetupError::MissingLlmApiKey)?;
    let classifier = OpenAiClassifier::with_base_url(
        api_key,
        &config.llm_model,
        config.llm_timeout_secs,
        &config.llm_base_url,
    )?;
    Ok(Arc::new(classifier))
}

/// Webhook sink when a URL is configured, log-only sink otherwise.
///
/// # Errors
///
/// Returns [`SetupError::Notify`] if the HTTP client cannot be built.
pub fn notifier_from_config(config: &AppConfig) -> Result<Arc<dyn NotificationSink>, SetupError> {
    match config.notify_webhook_url.as_deref() {
        Some(url) => {
            let sink = WebhookNotificationSink::new(
                url,
                config.notify_api_key.clone(),
                config.connector_timeout_secs,
            )?;
            Ok(Arc::new(sink))
        }
        None => {
            tracing::warn!("LEADHOUND_NOTIFY_WEBHOOK_URL not set, delivery notifications are logged only");
            Ok(Arc::new(LogNotificationSink))
        }
    }
}

/// # Errors
///
/// See [`classifier_from_config`] and [`notifier_from_config`].
pub fn orchestrator_from_config(
    config: &AppConfig,
    pool: PgPool,
) -> Result<Orchestrator, SetupError> {
    Ok(Orchestrator::new(
        Arc::new(PgRunStore::new(pool, config.max_concurrent_runs)),
        ConnectorRegistry::from_config(config)?,
        classifier_from_config(config)?,
        notifier_from_config(config)?,
        OrchestratorConfig::from_app_config(config),
    ))
}
