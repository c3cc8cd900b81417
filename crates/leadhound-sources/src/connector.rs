use async_trait::async_trait;
use leadhound_core::{NormalizedPost, Platform};

use crate::error::SourceError;

/// Result ordering requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchSort {
    #[default]
    Relevance,
    New,
}

impl SearchSort {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SearchSort::Relevance => "relevance",
            SearchSort::New => "new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of posts to return.
    pub limit: u32,
    /// Posts older than this many days are dropped.
    pub max_age_days: u32,
    pub sort: SearchSort,
}

/// A search backend for one content platform.
///
/// Implementations enforce `options.max_age_days` and `options.limit`
/// themselves even when the backend claims to, and return `Ok(vec![])` when
/// nothing matches.
#[async_trait]
pub trait SearchConnector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Runs one search query.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, authentication, rate-limit or
    /// response-shape failures.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<NormalizedPost>, SourceError>;
}

/// Drops posts older than the cutoff and caps the result at `limit`.
pub(crate) fn enforce_bounds(
    posts: Vec<NormalizedPost>,
    options: &SearchOptions,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<NormalizedPost> {
    let limit = usize::try_from(options.limit).unwrap_or(usize::MAX);
    posts
        .into_iter()
        .filter(|post| post.is_within_age(options.max_age_days, now))
        .take(limit)
        .collect()
}
