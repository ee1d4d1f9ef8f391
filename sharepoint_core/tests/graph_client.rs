mod common;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::time::Duration;

use common::{graph_client, graph_client_with, graph_settings, CountingProvider};
use sharepoint_core::error::AuthFailureReason;
use sharepoint_core::SharePointError;

#[tokio::test]
async fn attaches_bearer_token_and_reuses_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "site-1"})))
        .expect(2)
        .mount(&server)
        .await;

    let provider = CountingProvider::new();
    let graph = graph_client(&server, provider.clone());
    assert_eq!(graph.get_json("sites/site-1").await.unwrap()["id"], "site-1");
    assert_eq!(graph.get_json("/sites/site-1").await.unwrap()["id"], "site-1");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn unauthorized_refreshes_once_then_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let provider = CountingProvider::new();
    let graph = graph_client(&server, provider.clone());
    let err = graph.get_json("sites/site-1").await.unwrap_err();

    assert!(matches!(
        err,
        SharePointError::Authentication {
            reason: AuthFailureReason::Rejected,
            ..
        }
    ));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn unauthorized_then_success_uses_fresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "site-1"})))
        .mount(&server)
        .await;

    let provider = CountingProvider::new();
    let graph = graph_client(&server, provider.clone());
    assert_eq!(graph.get_json("sites/site-1").await.unwrap()["id"], "site-1");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn forbidden_is_permission_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "accessDenied", "message": "Either scp or roles claim need to be present"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    let err = graph.get_json("sites/site-1/lists").await.unwrap_err();
    match err {
        SharePointError::Permission(message) => assert!(message.contains("accessDenied")),
        other => panic!("expected permission error, got {:?}", other),
    }
}

#[tokio::test]
async fn throttling_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "site-1"})))
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    assert_eq!(graph.get_json("sites/site-1").await.unwrap()["id"], "site-1");
}

#[tokio::test]
async fn server_errors_exhaust_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/search/query"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    let err = graph
        .post_json("search/query", json!({"requests": []}))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    match err {
        SharePointError::TransientService {
            status, attempts, ..
        } => {
            assert_eq!(status, Some(503));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected transient error, got {:?}", other),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/sites/site-1/lists"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "invalidRequest", "message": "displayName is required"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    let err = graph
        .post_json("sites/site-1/lists", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SharePointError::Request { status: 400, .. }));

    let err = graph.get_json("sites/site-1/lists/missing").await.unwrap_err();
    assert!(matches!(err, SharePointError::NotFound(_)));
}

#[tokio::test]
async fn collections_follow_next_links() {
    let server = MockServer::start().await;
    let next = format!("{}/v1.0/sites/site-1/lists?$skiptoken=page2", server.uri());
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists"))
        .and(query_param_is_missing("$skiptoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "a"}, {"id": "b"}],
            "@odata.nextLink": next,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "c"}],
        })))
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    let items = graph.get_collection("sites/site-1/lists").await.unwrap();
    let ids: Vec<&str> = items.iter().filter_map(|i| i["id"].as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn uploads_send_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1.0/drives/d1/root:/notes.txt:/content"))
        .and(header("content-type", "text/plain"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "item-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let graph = graph_client(&server, CountingProvider::new());
    let created = graph
        .put_bytes("drives/d1/root:/notes.txt:/content", b"hi".to_vec(), "text/plain")
        .await
        .unwrap();
    assert_eq!(created["id"], "item-9");
}

fn impatient_client(server: &MockServer) -> std::sync::Arc<sharepoint_core::graph::GraphClient> {
    let mut settings = graph_settings(server);
    settings.timeout_secs = 1;
    graph_client_with(settings, CountingProvider::new())
}

#[tokio::test]
async fn writes_are_not_replayed_after_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/sites/site-1/lists/l1/items"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": "1"}))
                .set_delay(Duration::from_millis(2500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = impatient_client(&server)
        .post_json("sites/site-1/lists/l1/items", json!({"fields": {"Title": "x"}}))
        .await
        .unwrap_err();
    match err {
        SharePointError::TransientService {
            status, attempts, ..
        } => {
            assert_eq!(status, None);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected transient error, got {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn reads_are_retried_after_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "site-1"}))
                .set_delay(Duration::from_millis(2500)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let err = impatient_client(&server)
        .get_json("sites/site-1")
        .await
        .unwrap_err();
    match err {
        SharePointError::TransientService {
            status, attempts, ..
        } => {
            assert_eq!(status, None);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected transient error, got {:?}", other),
    }
}
