use serde_json::json;
use spool_core::{ApiErrorClass, PutOutcome, StoreClient, StoreError};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ping_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), Some("test-token".into())).unwrap();
    client.ping().await.unwrap();
}

#[tokio::test]
async fn ping_reports_rejected_credentials_as_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), Some("stale".into())).unwrap();
    let err = client.ping().await.expect_err("expected auth failure");

    assert!(err.is_fatal());
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
}

#[tokio::test]
async fn put_sends_only_create_precondition_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/objects/content"))
        .and(query_param("path", "/logs/a.log"))
        .and(header("if-none-match", "*"))
        .and(body_bytes(b"payload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), None).unwrap();
    let outcome = client
        .put("/logs/a.log", b"payload".to_vec(), true)
        .await
        .unwrap();

    assert_eq!(outcome, PutOutcome::Created);
}

#[tokio::test]
async fn put_maps_precondition_failed_to_already_exists() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/objects/content"))
        .and(query_param("path", "/logs/b.log"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), None).unwrap();
    let outcome = client
        .put("/logs/b.log", b"payload".to_vec(), true)
        .await
        .unwrap();

    assert_eq!(outcome, PutOutcome::AlreadyExists);
}

#[tokio::test]
async fn put_surfaces_other_statuses_as_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/objects/content"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), None).unwrap();
    let err = client
        .put("/logs/c.log", b"payload".to_vec(), true)
        .await
        .expect_err("expected api error");

    match err {
        StoreError::Api { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn info_returns_remote_checksum() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .and(query_param("path", "/logs/b.log"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "/logs/b.log",
            "size": 5,
            "md5": "5d41402abc4b2a76b9719d911017c592",
            "modified": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), None).unwrap();
    let info = client.info("/logs/b.log").await.unwrap();

    assert_eq!(info.path, "/logs/b.log");
    assert_eq!(info.size, Some(5));
    assert_eq!(
        info.md5.as_deref(),
        Some("5d41402abc4b2a76b9719d911017c592")
    );
}

#[tokio::test]
async fn info_tolerates_missing_checksum() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "/logs/x.log"
        })))
        .mount(&server)
        .await;

    let client = StoreClient::new(&server.uri(), None).unwrap();
    let info = client.info("/logs/x.log").await.unwrap();

    assert!(info.md5.is_none());
    assert!(info.size.is_none());
}

#[tokio::test]
async fn requests_stay_under_base_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/store/v1/status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/store/v1/objects/content"))
        .and(query_param("path", "/logs/a.log"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = StoreClient::new(&format!("{}/store/", server.uri()), None).unwrap();
    client.ping().await.unwrap();
    let outcome = client.put("/logs/a.log", "x", true).await.unwrap();

    assert_eq!(outcome, PutOutcome::Created);
}
