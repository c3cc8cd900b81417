//! Delivery notification sinks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::NotifyError;

/// Payload handed to the delivery-email collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: String,
    pub lead_count: u32,
    pub target_count: u32,
    pub platform_label: String,
    pub dashboard_url: String,
}

/// Fire-and-forget delivery side effect. Callers log failures and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the notification could not be handed off.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts the notification as JSON to an email service webhook.
pub struct WebhookNotificationSink {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl WebhookNotificationSink {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
            api_key,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        tracing::info!(lead_count = notification.lead_count, "delivery notification sent");
        Ok(())
    }
}

/// Used when no email service is configured.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            lead_count = notification.lead_count,
            target_count = notification.target_count,
            platform = %notification.platform_label,
            dashboard_url = %notification.dashboard_url,
            "no notification service configured, delivery logged only"
        );
        Ok(())
    }
}
