use bytes::Bytes;
use std::time::Duration;

use diskmirror_common::{AccessToken, Error, RemoteOperation};
use diskmirror_storage::{DiskConfig, DiskProvider, RemoteStorage};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOLDER: &str = "disk:/backup";

fn setup(server: &MockServer) -> DiskProvider {
    let token = AccessToken::new("test-token").unwrap();
    DiskProvider::new(DiskConfig::new(token).with_base_url(server.uri())).unwrap()
}

fn setup_with_timeout(server: &MockServer, timeout: Duration) -> DiskProvider {
    let token = AccessToken::new("test-token").unwrap();
    let config = DiskConfig::new(token)
        .with_base_url(server.uri())
        .with_timeout(timeout);
    DiskProvider::new(config).unwrap()
}

fn items(names: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        names
            .iter()
            .map(|name| serde_json::json!({ "name": name, "type": "file", "size": 1 }))
            .collect(),
    )
}

// --- Listing ---

#[tokio::test]
async fn list_sends_oauth_header_and_decodes_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("path", FOLDER))
        .and(header("Authorization", "OAuth test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_embedded": {
                "items": [{"name": "a.txt", "type": "file"}, {"name": "b.txt", "type": "file"}],
                "limit": 100,
                "offset": 0,
                "total": 2
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = setup(&server);
    let response = provider.list(FOLDER).await.unwrap();

    assert_eq!(response.status, 200);
    let names: Vec<_> = response.body.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn list_follows_pages_until_total() {
    let server = MockServer::start().await;
    let first: Vec<String> = (0..100).map(|i| format!("file-{:03}.txt", i)).collect();
    let second: Vec<String> = (100..150).map(|i| format!("file-{:03}.txt", i)).collect();

    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_embedded": { "items": items(&first), "limit": 100, "offset": 0, "total": 150 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_embedded": { "items": items(&second), "limit": 100, "offset": 100, "total": 150 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = setup(&server);
    let entries = provider.list(FOLDER).await.unwrap().body;

    assert_eq!(entries.len(), 150);
    assert_eq!(entries[0].name, "file-000.txt");
    assert_eq!(entries[149].name, "file-149.txt");
}

#[tokio::test]
async fn get_info_is_a_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_embedded": { "items": [], "limit": 100, "offset": 0, "total": 0 }
        })))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let response = provider.get_info(FOLDER).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn list_unauthorized_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "UnauthorizedError",
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let err = provider.list(FOLDER).await.unwrap_err();

    match err {
        Error::Remote {
            operation,
            status,
            cause,
            ..
        } => {
            assert_eq!(operation, RemoteOperation::List);
            assert_eq!(status, Some(401));
            assert!(cause.contains("UnauthorizedError"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn list_malformed_body_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let err = provider.list(FOLDER).await.unwrap_err();
    assert!(matches!(err, Error::Remote { operation: RemoteOperation::List, status: Some(200), .. }));
}

// --- Upload ---

#[tokio::test]
async fn upload_requests_link_then_puts_bytes() {
    let server = MockServer::start().await;
    let href = format!("{}/upload-target/42", server.uri());

    Mock::given(method("GET"))
        .and(path("/resources/upload"))
        .and(query_param("path", "disk:/backup/notes.txt"))
        .and(query_param("overwrite", "false"))
        .and(header("Authorization", "OAuth test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "href": href,
            "method": "PUT",
            "templated": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload-target/42"))
        .and(body_bytes(b"hello disk".to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("notes.txt");
    std::fs::write(&local, b"hello disk").unwrap();

    let provider = setup(&server);
    let response = provider.upload(FOLDER, &local, false).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn upload_link_passes_overwrite_true() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/upload"))
        .and(query_param("overwrite", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "href": format!("{}/upload-target/1", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = setup(&server);
    let ticket = provider
        .request_upload_link(FOLDER, "notes.txt", true)
        .await
        .unwrap()
        .body;
    assert_eq!(ticket.method, "PUT");
}

#[tokio::test]
async fn upload_link_conflict_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/upload"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": "DiskResourceAlreadyExistsError",
            "message": "Resource already exists"
        })))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let err = provider
        .request_upload_link(FOLDER, "notes.txt", false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Remote { operation: RemoteOperation::UploadLink, status: Some(409), .. }
    ));
}

#[tokio::test]
async fn commit_failure_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload-target/7"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let ticket = diskmirror_storage::UploadTicket {
        href: format!("{}/upload-target/7", server.uri()).parse().unwrap(),
        method: "PUT".to_string(),
        templated: false,
    };

    let err = provider
        .commit_upload(&ticket, Bytes::from_static(b"data"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Remote { operation: RemoteOperation::CommitUpload, status: Some(507), .. }
    ));
}

#[tokio::test]
async fn upload_streams_file_past_request_timeout() {
    let server = MockServer::start().await;
    let data: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/resources/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "href": format!("{}/upload-target/big", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload-target/big"))
        .and(header("content-length", "262144"))
        .and(body_bytes(data.clone()))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("big.bin");
    std::fs::write(&local, &data).unwrap();

    // The transfer is allowed to outlast the per-call timeout.
    let provider = setup_with_timeout(&server, Duration::from_secs(1));
    let response = provider.upload(FOLDER, &local, true).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn api_call_past_timeout_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "_embedded": { "items": [], "total": 0 } }))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let provider = setup_with_timeout(&server, Duration::from_millis(300));
    let err = provider.list(FOLDER).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Remote { operation: RemoteOperation::List, status: None, .. }
    ));
}

// --- Delete ---

#[tokio::test]
async fn delete_targets_file_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/resources"))
        .and(query_param("path", "disk:/backup/old.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let provider = setup(&server);
    let response = provider.delete(FOLDER, "old.txt").await.unwrap();
    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn delete_missing_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "DiskNotFoundError",
            "description": "Resource not found."
        })))
        .mount(&server)
        .await;

    let provider = setup(&server);
    let err = provider.delete(FOLDER, "ghost.txt").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("disk:/backup/ghost.txt"));
}

#[tokio::test]
async fn transport_failure_has_no_status() {
    // Nothing listens on port 9 of localhost.
    let token = AccessToken::new("test-token").unwrap();
    let provider = DiskProvider::new(DiskConfig::new(token).with_base_url("http://127.0.0.1:9")).unwrap();

    let err = provider.delete(FOLDER, "a.txt").await.unwrap_err();
    assert!(matches!(err, Error::Remote { status: None, .. }));
}
