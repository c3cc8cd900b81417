//! Integration tests for `OpenAiClassifier` using wiremock HTTP mocks.

use leadhound_classifier::{
    Classifier, ClassifierError, ClassifyContext, ClassifyItem, OpenAiClassifier,
};
use leadhound_core::Intent;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_classifier(base_url: &str) -> OpenAiClassifier {
    OpenAiClassifier::with_base_url("test-key", "test-model", 30, base_url)
        .expect("classifier construction should not fail")
}

fn item(id: &str) -> ClassifyItem {
    ClassifyItem {
        external_id: id.to_owned(),
        title: "Anyone know a cheaper alternative to Mailchimp?".to_owned(),
        content: "Our list grew and the bill tripled.".to_owned(),
        community: Some("emailmarketing".to_owned()),
    }
}

fn context() -> ClassifyContext {
    ClassifyContext {
        description: "Affordable newsletter platform".to_owned(),
        keywords: vec!["newsletter tool".to_owned()],
        website_url: "https://letters.test".to_owned(),
    }
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
        ]
    })
}

#[tokio::test]
async fn classify_sends_json_mode_request_and_parses_verdicts() {
    let server = MockServer::start().await;
    let reply = serde_json::json!({
        "verdicts": [
            { "externalId": "t3_a", "intent": "alternative", "relevance": 92, "reason": "explicitly asks for a cheaper alternative" },
            { "externalId": "t3_b", "intent": "question", "relevance": 12, "reason": "general chat" }
        ]
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&reply)))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = test_classifier(&server.uri());
    let verdicts = classifier
        .classify(&[item("t3_a"), item("t3_b")], &context())
        .await
        .expect("classification should succeed");

    assert_eq!(verdicts.len(), 2);
    assert_eq!(verdicts[0].intent, Intent::Alternative);
    assert_eq!(verdicts[0].relevance, 92);
    assert_eq!(verdicts[1].external_id, "t3_b");
}

#[tokio::test]
async fn incomplete_reply_is_malformed() {
    let server = MockServer::start().await;
    let reply = serde_json::json!({
        "verdicts": [{ "externalId": "t3_a", "intent": "alternative", "relevance": 92, "reason": "x" }]
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&reply)))
        .mount(&server)
        .await;

    let classifier = test_classifier(&server.uri());
    let result = classifier
        .classify(&[item("t3_a"), item("t3_b")], &context())
        .await;

    assert!(matches!(result, Err(ClassifierError::Malformed(_))));
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let classifier = test_classifier(&server.uri());
    let result = classifier.classify(&[item("t3_a")], &context()).await;

    assert!(matches!(result, Err(ClassifierError::Api { status: 500, .. })));
}

#[tokio::test]
async fn empty_batch_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let classifier = test_classifier(&server.uri());
    let verdicts = classifier.classify(&[], &context()).await.unwrap();

    assert!(verdicts.is_empty());
}
