//! Contract tests every transport adapter must satisfy, run against the
//! in-memory adapter and the wiremock-backed HTTP gateway adapter.

use tempfile::tempdir;
use updrift_core::{
    CheckpointStore, ErrorKind, HttpTransport, MemoryTransport, RemoteEntry, Transport,
};
use wiremock::matchers::{body_bytes, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn assert_delete_missing_is_not_found(transport: &dyn Transport) {
    let err = transport
        .delete("/contract/missing.txt")
        .await
        .expect_err("deleting a missing object must fail with NotFound");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

async fn assert_close_is_idempotent(transport: &dyn Transport) {
    transport.close().await;
    transport.close().await;
}

async fn assert_upload_then_list(transport: &dyn Transport, expected: Vec<RemoteEntry>) {
    transport
        .upload_bytes(b"payload".to_vec(), "/contract/a.txt")
        .await
        .unwrap();
    assert_eq!(transport.list("/contract").await, expected);
}

fn http_transport(server: &MockServer, dir: &std::path::Path) -> HttpTransport {
    HttpTransport::new(
        &server.uri(),
        None,
        CheckpointStore::new(dir.join("ckpt")),
        0,
        updrift_core::DEFAULT_PART_BYTES,
    )
    .unwrap()
}

#[tokio::test]
async fn memory_delete_missing_is_not_found() {
    assert_delete_missing_is_not_found(&MemoryTransport::new()).await;
}

#[tokio::test]
async fn http_delete_missing_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/o/contract/missing.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    assert_delete_missing_is_not_found(&http_transport(&server, dir.path())).await;
}

#[tokio::test]
async fn memory_close_is_idempotent() {
    let transport = MemoryTransport::new();
    assert_close_is_idempotent(&transport).await;
    assert!(transport.is_closed());
}

#[tokio::test]
async fn http_close_is_idempotent() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    assert_close_is_idempotent(&http_transport(&server, dir.path())).await;
}

#[tokio::test]
async fn memory_upload_then_list() {
    assert_upload_then_list(
        &MemoryTransport::new(),
        vec![RemoteEntry {
            name: "/contract/a.txt".into(),
            size: 7,
        }],
    )
    .await;
}

#[tokio::test]
async fn http_upload_then_list() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/o/contract/a.txt"))
        .and(body_bytes(b"payload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{ "name": "a.txt", "size": 7 }]
        })))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    assert_upload_then_list(
        &http_transport(&server, dir.path()),
        vec![RemoteEntry {
            name: "a.txt".into(),
            size: 7,
        }],
    )
    .await;
}

#[tokio::test]
async fn flat_store_accepts_directory_calls_without_requests() {
    // Nothing mounted: the HTTP adapter would error on any request, so a
    // passing make_dir/remove_dir proves the flat-store no-op contract.
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let transport = http_transport(&server, dir.path());
    transport.make_dir("/contract/sub", true).await.unwrap();
    transport.remove_dir("/contract/sub", true).await.unwrap();
}

#[tokio::test]
async fn hierarchical_store_round_trips_directories() {
    let transport = MemoryTransport::new();
    transport.make_dir("/contract/sub", true).await.unwrap();
    assert!(transport.dir_exists("/contract/sub"));
    transport.remove_dir("/contract/sub", true).await.unwrap();
    assert!(!transport.dir_exists("/contract/sub"));
}

#[tokio::test]
async fn list_on_error_is_empty_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/o"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let transport = http_transport(&server, dir.path());
    assert!(transport.list("/contract").await.is_empty());
}

#[tokio::test]
async fn auth_rejection_surfaces_auth_kind_on_connect() {
    let transport = MemoryTransport::rejecting_auth();
    let err = transport.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
}
