//! Reddit search connector (client-credentials OAuth).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadhound_core::{NormalizedPost, Platform};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::connector::{enforce_bounds, SearchConnector, SearchOptions};
use crate::error::SourceError;
use crate::retry::{connector_policy, is_retriable, retry_with_backoff};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const PLATFORM: &str = "reddit";
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: usize = 4;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3_600
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    name: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    author: String,
    subreddit: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    created_utc: Option<f64>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Searches Reddit posts through `oauth.reddit.com/search`.
///
/// The access token is fetched lazily and reused until shortly before it
/// expires. Use [`RedditConnector::with_base_urls`] to point at a mock server.
pub struct RedditConnector {
    client: Client,
    credentials: RedditCredentials,
    token_url: String,
    api_base: String,
    backoff_base_ms: u64,
    token: Mutex<Option<CachedToken>>,
}

impl RedditConnector {
    #[must_use]
    pub fn new(client: Client, credentials: RedditCredentials) -> Self {
        Self::with_base_urls(client, credentials, TOKEN_URL, API_BASE)
    }

    #[must_use]
    pub fn with_base_urls(
        client: Client,
        credentials: RedditCredentials,
        token_url: &str,
        api_base: &str,
    ) -> Self {
        Self {
            client,
            credentials,
            token_url: token_url.to_owned(),
            api_base: api_base.trim_end_matches('/').to_owned(),
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            token: Mutex::new(None),
        }
    }

    /// Overrides the base delay between retried requests.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = retry_with_backoff(
            connector_policy(self.backoff_base_ms),
            "reddit token",
            is_retriable,
            || self.request_token(),
        )
        .await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let access_token = fresh.access_token.clone();
        *cached = Some(CachedToken {
            access_token: fresh.access_token,
            refresh_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<TokenResponse, SourceError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("User-Agent", &self.credentials.user_agent)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited { platform: PLATFORM }),
            status if !status.is_success() => Err(SourceError::Auth {
                platform: PLATFORM,
                reason: format!("token exchange failed with status {status}"),
            }),
            _ => {
                let text = response.text().await?;
                serde_json::from_str(&text).map_err(|e| SourceError::Deserialize {
                    context: "reddit access token".to_owned(),
                    source: e,
                })
            }
        }
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    async fn search_page(
        &self,
        token: &str,
        query: &str,
        options: &SearchOptions,
        page_limit: u32,
        after: Option<&str>,
    ) -> Result<ListingData, SourceError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_owned()),
            ("type", "link".to_owned()),
            ("sort", options.sort.as_str().to_owned()),
            ("t", time_filter(options.max_age_days).to_owned()),
            ("limit", page_limit.to_string()),
            ("raw_json", "1".to_owned()),
        ];
        if let Some(cursor) = after {
            params.push(("after", cursor.to_owned()));
        }

        let response = self
            .client
            .get(format!("{}/search", self.api_base))
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", &self.credentials.user_agent)
            .query(&params)
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited { platform: PLATFORM }),
            StatusCode::UNAUTHORIZED => {
                self.forget_token().await;
                Err(SourceError::Auth {
                    platform: PLATFORM,
                    reason: "access token rejected".to_owned(),
                })
            }
            status if !status.is_success() => Err(SourceError::UnexpectedStatus {
                platform: PLATFORM,
                status: status.as_u16(),
            }),
            _ => {
                let text = response.text().await?;
                let listing: Listing =
                    serde_json::from_str(&text).map_err(|e| SourceError::Deserialize {
                        context: format!("reddit search(q={query})"),
                        source: e,
                    })?;
                Ok(listing.data)
            }
        }
    }
}

#[async_trait]
impl SearchConnector for RedditConnector {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        let now = Utc::now();
        let token = self.access_token().await?;
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let wanted = options.limit.saturating_sub(u32::try_from(posts.len()).unwrap_or(u32::MAX));
            if wanted == 0 {
                break;
            }
            let page_limit = wanted.min(PAGE_LIMIT);
            let page = retry_with_backoff(
                connector_policy(self.backoff_base_ms),
                "reddit search",
                is_retriable,
                || self.search_page(&token, query, options, page_limit, after.as_deref()),
            )
            .await?;

            posts.extend(
                page.children
                    .into_iter()
                    .map(|child| to_normalized(child.data))
                    .filter(|post| post.is_within_age(options.max_age_days, now)),
            );

            after = page.after;
            if after.is_none() {
                break;
            }
        }

        tracing::debug!(query, count = posts.len(), "reddit search complete");
        Ok(enforce_bounds(posts, options, now))
    }
}

/// Narrowest Reddit `t` window that still covers `max_age_days`.
fn time_filter(max_age_days: u32) -> &'static str {
    match max_age_days {
        0..=1 => "day",
        2..=7 => "week",
        8..=31 => "month",
        32..=365 => "year",
        _ => "all",
    }
}

fn to_normalized(data: PostData) -> NormalizedPost {
    let external_id = data.name.unwrap_or_else(|| format!("t3_{}", data.id));
    let url = if data.permalink.starts_with("http") {
        data.permalink
    } else {
        format!("https://www.reddit.com{}", data.permalink)
    };

    NormalizedPost {
        id: data.id,
        external_id,
        title: data.title,
        content: data.selftext,
        url,
        author: data.author,
        community: data.subreddit,
        score: data.score,
        num_comments: data.num_comments,
        created_utc: data.created_utc.and_then(from_epoch_secs),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs.trunc() as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_filter_covers_the_age_window() {
        assert_eq!(time_filter(1), "day");
        assert_eq!(time_filter(7), "week");
        assert_eq!(time_filter(30), "month");
        assert_eq!(time_filter(90), "year");
        assert_eq!(time_filter(365), "year");
        assert_eq!(time_filter(1_000), "all");
    }

    #[test]
    fn normalizes_fullname_permalink_and_timestamp() {
        let post = to_normalized(PostData {
            id: "abc123".to_owned(),
            name: None,
            title: "Best CRM for a 3 person agency?".to_owned(),
            selftext: "We outgrew spreadsheets".to_owned(),
            permalink: "/r/smallbusiness/comments/abc123/best_crm/".to_owned(),
            author: "agency_owner".to_owned(),
            subreddit: Some("smallbusiness".to_owned()),
            score: 12,
            num_comments: 8,
            created_utc: Some(1_700_000_000.0),
        });

        assert_eq!(post.external_id, "t3_abc123");
        assert_eq!(
            post.url,
            "https://www.reddit.com/r/smallbusiness/comments/abc123/best_crm/"
        );
        assert_eq!(post.community.as_deref(), Some("smallbusiness"));
        assert_eq!(post.created_utc.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn non_finite_timestamps_are_dropped() {
        assert!(from_epoch_secs(f64::NAN).is_none());
    }
}
