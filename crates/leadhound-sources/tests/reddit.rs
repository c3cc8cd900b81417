//! Integration tests for `RedditConnector` using wiremock HTTP mocks.

use chrono::{Duration, Utc};
use leadhound_sources::{
    RedditConnector, RedditCredentials, SearchConnector, SearchOptions, SearchSort, SourceError,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_connector(server: &MockServer) -> RedditConnector {
    RedditConnector::with_base_urls(
        reqwest::Client::new(),
        RedditCredentials {
            client_id: "id".to_owned(),
            client_secret: "secret".to_owned(),
            user_agent: "leadhound-test".to_owned(),
        },
        &format!("{}/api/v1/access_token", server.uri()),
        &server.uri(),
    )
    .with_backoff_base_ms(0)
}

fn options(limit: u32) -> SearchOptions {
    SearchOptions {
        limit,
        max_age_days: 30,
        sort: SearchSort::Relevance,
    }
}

fn child(id: &str, subreddit: &str, age_days: i64) -> serde_json::Value {
    #[allow(clippy::cast_precision_loss)]
    let created = (Utc::now() - Duration::days(age_days)).timestamp() as f64;
    serde_json::json!({
        "kind": "t3",
        "data": {
            "id": id,
            "name": format!("t3_{id}"),
            "title": format!("Looking for a tool ({id})"),
            "selftext": "Our current setup is painful.",
            "permalink": format!("/r/{subreddit}/comments/{id}/x/"),
            "author": "someone",
            "subreddit": subreddit,
            "score": 5,
            "num_comments": 2,
            "created_utc": created
        }
    })
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn search_normalizes_posts_and_drops_stale_ones() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("Authorization", "Bearer tok"))
        .and(query_param("q", "crm for agencies"))
        .and(query_param("type", "link"))
        .and(query_param("sort", "relevance"))
        .and(query_param("t", "month"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [child("a1", "smallbusiness", 2), child("old", "smallbusiness", 90)]
            }
        })))
        .mount(&server)
        .await;

    let connector = test_connector(&server);
    let posts = connector
        .search("crm for agencies", &options(25))
        .await
        .expect("search should succeed");

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].external_id, "t3_a1");
    assert_eq!(posts[0].community.as_deref(), Some("smallbusiness"));
    assert!(posts[0].url.ends_with("/r/smallbusiness/comments/a1/x/"));
}

#[tokio::test]
async fn token_is_cached_across_searches() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "after": null, "children": [] }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let connector = test_connector(&server);
    connector.search("one", &options(10)).await.unwrap();
    connector.search("two", &options(10)).await.unwrap();
}

#[tokio::test]
async fn follows_after_cursor_until_limit() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("after", "t3_p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "after": "t3_p2", "children": [child("p2", "saas", 1), child("p3", "saas", 1)] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "after": "t3_p1", "children": [child("p1", "saas", 1)] }
        })))
        .mount(&server)
        .await;

    let connector = test_connector(&server);
    let posts = connector.search("billing", &options(2)).await.unwrap();

    let ids: Vec<_> = posts.iter().map(|p| p.external_id.as_str()).collect();
    assert_eq!(ids, vec!["t3_p1", "t3_p2"]);
}

#[tokio::test]
async fn rate_limit_is_retried_then_reported() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let connector = test_connector(&server);
    let result = connector.search("crm", &options(10)).await;

    assert!(matches!(result, Err(SourceError::RateLimited { .. })));
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let connector = test_connector(&server);
    let result = connector.search("crm", &options(10)).await;

    assert!(matches!(result, Err(SourceError::Auth { .. })));
}
