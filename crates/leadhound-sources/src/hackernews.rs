//! Hacker News search connector backed by the public Algolia API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use leadhound_core::{NormalizedPost, Platform};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::connector::{enforce_bounds, SearchConnector, SearchOptions, SearchSort};
use crate::error::SourceError;
use crate::retry::{connector_policy, is_retriable, retry_with_backoff};

const DEFAULT_BASE_URL: &str = "https://hn.algolia.com/api/v1";
const PLATFORM: &str = "hackernews";
const MAX_HITS_PER_PAGE: u32 = 1_000;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    story_text: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    num_comments: Option<i64>,
    created_at_i: Option<i64>,
}

pub struct HackerNewsConnector {
    client: Client,
    base_url: String,
    backoff_base_ms: u64,
}

impl HackerNewsConnector {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Points the connector at a custom Algolia-compatible endpoint (for tests).
    #[must_use]
    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }

    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    async fn request(
        &self,
        query: &str,
        options: &SearchOptions,
        cutoff: i64,
    ) -> Result<SearchResponse, SourceError> {
        let endpoint = match options.sort {
            SearchSort::Relevance => "search",
            SearchSort::New => "search_by_date",
        };
        let params = [
            ("query", query.to_owned()),
            ("tags", "story".to_owned()),
            ("numericFilters", format!("created_at_i>{cutoff}")),
            (
                "hitsPerPage",
                options.limit.min(MAX_HITS_PER_PAGE).to_string(),
            ),
        ];

        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(&params)
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited { platform: PLATFORM }),
            status if !status.is_success() => Err(SourceError::UnexpectedStatus {
                platform: PLATFORM,
                status: status.as_u16(),
            }),
            _ => {
                let text = response.text().await?;
                serde_json::from_str(&text).map_err(|e| SourceError::Deserialize {
                    context: format!("hackernews {endpoint}(query={query})"),
                    source: e,
                })
            }
        }
    }
}

#[async_trait]
impl SearchConnector for HackerNewsConnector {
    fn platform(&self) -> Platform {
        Platform::HackerNews
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        if options.limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let cutoff = (now - Duration::days(i64::from(options.max_age_days))).timestamp();

        let response = retry_with_backoff(
            connector_policy(self.backoff_base_ms),
            "hackernews search",
            is_retriable,
            || self.request(query, options, cutoff),
        )
        .await?;

        let posts: Vec<NormalizedPost> = response.hits.into_iter().filter_map(to_normalized).collect();
        tracing::debug!(query, count = posts.len(), "hacker news search complete");
        Ok(enforce_bounds(posts, options, now))
    }
}

/// Hits without a title are comments or polls that slipped through the tag filter.
fn to_normalized(hit: Hit) -> Option<NormalizedPost> {
    let title = hit.title.filter(|t| !t.trim().is_empty())?;
    let discussion_url = format!("https://news.ycombinator.com/item?id={}", hit.object_id);

    Some(NormalizedPost {
        external_id: format!("hn_{}", hit.object_id),
        url: hit.url.filter(|u| !u.is_empty()).unwrap_or(discussion_url),
        id: hit.object_id,
        title,
        content: hit.story_text.unwrap_or_default(),
        author: hit.author.unwrap_or_default(),
        community: None,
        score: hit.points.unwrap_or(0),
        num_comments: hit.num_comments.unwrap_or(0),
        created_utc: hit
            .created_at_i
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}
