//! CRM backend client tests
//!
//! Exercises the HTTP client against a mock backend server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crm_segments::config::BackendConfig;
use crm_segments::services::{
    AudienceEvaluator, CrmApiClient, RuleGenerator, SegmentStore, StaticSession,
};
use crm_segments::models::CreateSegmentRequest;
use crm_segments::{AppError, RuleTree};

use crate::common::{ids, RuleFixtures, SessionFixtures};

fn config(server: &MockServer) -> BackendConfig {
    BackendConfig {
        url: server.uri(),
        timeout_secs: 1,
        ssl_verify: true,
    }
}

fn signed_in_client(server: &MockServer) -> CrmApiClient {
    let session = Arc::new(StaticSession::new(SessionFixtures::signed_in()));
    CrmApiClient::new(&config(server), session).unwrap()
}

fn bearer() -> String {
    format!("Bearer {}", ids::TEST_TOKEN)
}

#[tokio::test]
async fn test_preview_posts_rules_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments/preview"))
        .and(header("authorization", bearer().as_str()))
        .and(body_json(json!({"rules": RuleFixtures::high_spenders_json()})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"audienceSize": 1240})))
        .expect(1)
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    let size = client
        .audience_size(&RuleFixtures::high_spenders())
        .await
        .unwrap();

    assert_eq!(size, 1240);
}

#[tokio::test]
async fn test_generate_rules_parses_tree() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments/generate-rules"))
        .and(body_json(json!({"query": "customers who spent over 1000"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"rules": RuleFixtures::nested_json()})),
        )
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    let tree = client
        .generate_rules("customers who spent over 1000")
        .await
        .unwrap();

    assert_eq!(tree, RuleFixtures::nested());
}

#[tokio::test]
async fn test_generate_rules_rejects_malformed_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments/generate-rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rules": [{"operator": "AND", "rules": []}]
        })))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    let err = client.generate_rules("anything").await.unwrap_err();

    assert!(matches!(err, AppError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_create_segment_accepts_mongo_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments"))
        .and(body_json(json!({
            "name": "High spenders",
            "rules": RuleFixtures::high_spenders_json()
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_id": ids::TEST_SEGMENT_ID,
            "name": "High spenders"
        })))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    let created = client
        .create_segment(&CreateSegmentRequest::new(
            "High spenders",
            RuleFixtures::high_spenders(),
        ))
        .await
        .unwrap();

    assert_eq!(created.id, ids::TEST_SEGMENT_ID);
}

#[tokio::test]
async fn test_list_and_get_segments() {
    let server = MockServer::start().await;
    let summary = json!({
        "_id": ids::TEST_SEGMENT_ID,
        "name": "Lapsed",
        "rules": RuleFixtures::nested_json(),
        "audienceSize": 87
    });
    Mock::given(method("GET"))
        .and(path("/api/segments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([summary.clone()])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/segments/{}", ids::TEST_SEGMENT_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/segments/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Segment not found"))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);

    let segments = client.list_segments().await.unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].audience_size, Some(87));

    let segment = client
        .get_segment(ids::TEST_SEGMENT_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(segment.name, "Lapsed");
    assert_eq!(segment.rules, RuleFixtures::nested());

    assert!(client.get_segment("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_backend_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments/preview"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Not authenticated"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/segments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);

    let err = client.audience_size(&RuleTree::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    match client.list_segments().await.unwrap_err() {
        AppError::Backend { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/segments/preview"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"audienceSize": 1}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    let err = client.audience_size(&RuleTree::new()).await.unwrap_err();

    assert!(matches!(err, AppError::Timeout));
}

#[tokio::test]
async fn test_signed_out_session_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"audienceSize": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let session = Arc::new(StaticSession::new(SessionFixtures::signed_in()));
    let client = CrmApiClient::new(&config(&server), session.clone()).unwrap();
    session.sign_out();

    let err = client.audience_size(&RuleTree::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_auth_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authenticated": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", bearer().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": ids::TEST_USER_ID,
            "email": "marketer@example.com",
            "name": "Test Marketer",
            "picture": "https://example.com/avatar.png"
        })))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);

    assert!(client.check_auth().await.unwrap());
    let user = client.current_user().await.unwrap();
    assert_eq!(user.id, ids::TEST_USER_ID);
    assert_eq!(user.picture.as_deref(), Some("https://example.com/avatar.png"));
}

#[tokio::test]
async fn test_rejected_session_reports_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/check"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = signed_in_client(&server);
    assert!(!client.check_auth().await.unwrap());
}
