use chrono::Utc;
use leadhound_core::NormalizedPost;

use crate::connector::{enforce_bounds, SearchConnector, SearchOptions};

/// Outcome of one query. `error` is set when the connector failed, in which
/// case `posts` is empty.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub posts: Vec<NormalizedPost>,
    pub error: Option<String>,
}

/// Runs one query and never fails.
///
/// A connector error is logged and turned into an empty result carrying a
/// warning, so one bad keyword cannot abort its siblings. The age cutoff and
/// `limit` are re-applied to whatever the connector returned.
pub async fn fetch(
    connector: &dyn SearchConnector,
    query: &str,
    options: &SearchOptions,
) -> FetchResult {
    let platform = connector.platform();
    match connector.search(query, options).await {
        Ok(posts) => {
            let posts = enforce_bounds(posts, options, Utc::now());
            tracing::debug!(%platform, query, count = posts.len(), "query fetched");
            FetchResult { posts, error: None }
        }
        Err(e) => {
            tracing::warn!(
                %platform,
                query,
                error = %e,
                "search connector failed, continuing with empty result"
            );
            FetchResult {
                posts: Vec::new(),
                error: Some(format!("{platform} search for \"{query}\" failed: {e}")),
            }
        }
    }
}
