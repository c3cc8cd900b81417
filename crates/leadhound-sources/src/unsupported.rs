use async_trait::async_trait;
use leadhound_core::{NormalizedPost, Platform};

use crate::connector::{SearchConnector, SearchOptions};
use crate::error::SourceError;

/// Stands in for platforms without a connector (or without credentials).
/// Every search succeeds with no posts.
pub struct UnsupportedConnector {
    platform: Platform,
}

impl UnsupportedConnector {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl SearchConnector for UnsupportedConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        tracing::debug!(
            platform = %self.platform,
            query,
            "no connector for platform, returning empty result"
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::SearchSort;

    #[tokio::test]
    async fn returns_empty_result_not_error() {
        let connector = UnsupportedConnector::new(Platform::LinkedIn);
        let options = SearchOptions {
            limit: 10,
            max_age_days: 30,
            sort: SearchSort::Relevance,
        };

        let posts = connector.search("crm", &options).await.unwrap();

        assert!(posts.is_empty());
        assert_eq!(connector.platform(), Platform::LinkedIn);
    }
}
