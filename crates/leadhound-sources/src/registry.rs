use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use leadhound_core::{AppConfig, Platform};
use reqwest::Client;

use crate::connector::SearchConnector;
use crate::error::SourceError;
use crate::hackernews::HackerNewsConnector;
use crate::reddit::{RedditConnector, RedditCredentials};
use crate::unsupported::UnsupportedConnector;

/// Maps each platform to its connector. Platforms without one resolve to an
/// [`UnsupportedConnector`].
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Arc<dyn SearchConnector>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the production registry.
    ///
    /// Reddit is only registered when both OAuth credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.connector_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.reddit_user_agent.clone())
            .build()?;

        let mut registry =
            Self::new().with_connector(Arc::new(HackerNewsConnector::new(client.clone())));

        match config.reddit_credentials() {
            Some((client_id, client_secret)) => {
                registry.register(Arc::new(RedditConnector::new(
                    client,
                    RedditCredentials {
                        client_id: client_id.to_owned(),
                        client_secret: client_secret.to_owned(),
                        user_agent: config.reddit_user_agent.clone(),
                    },
                )));
            }
            None => {
                tracing::warn!("REDDIT_CLIENT_ID/REDDIT_CLIENT_SECRET not set, reddit searches will return nothing");
            }
        }

        Ok(registry)
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn SearchConnector>) -> Self {
        self.register(connector);
        self
    }

    pub fn register(&mut self, connector: Arc<dyn SearchConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Arc<dyn SearchConnector> {
        self.connectors
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| Arc::new(UnsupportedConnector::new(platform)))
    }

    #[must_use]
    pub fn is_supported(&self, platform: Platform) -> bool {
        self.connectors.contains_key(&platform)
    }
}
