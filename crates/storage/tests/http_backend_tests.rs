//! Tests for the HTTP storage backend against a mock merge service.

use httpmock::Method::POST;
use httpmock::MockServer;
use loft_core::FileKey;
use loft_storage::{HttpBackend, StorageBackend, StorageError};
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&server.base_url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_merge_posts_key_and_chunk_count() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let key = FileKey::new();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/merge")
            .json_body(json!({ "file_key": key.to_string(), "total_chunks": 3 }));
        then.status(200)
            .json_body(json!({ "success": true, "message": "merged" }));
    });

    let reply = backend(&server).merge(key, 3).await.unwrap();
    mock.assert();
    assert!(reply.success);
    assert_eq!(reply.message, "merged");
}

#[tokio::test]
async fn test_unsuccessful_reply_is_not_an_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/merge");
        then.status(200)
            .json_body(json!({ "success": false, "message": "chunk 2 missing" }));
    });

    let reply = backend(&server).merge(FileKey::new(), 3).await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.message, "chunk 2 missing");
}

#[tokio::test]
async fn test_server_error_surfaces_status_and_body() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/delete");
        then.status(500).body("boom");
    });

    let err = backend(&server).delete(FileKey::new()).await.unwrap_err();
    match err {
        StorageError::Backend(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_reply_is_a_decode_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/merge");
        then.status(200).body("not json");
    });

    let err = backend(&server).merge(FileKey::new(), 1).await.unwrap_err();
    assert!(matches!(err, StorageError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_backend_is_an_http_error() {
    // Bind then drop to get a port nobody listens on.
    let port = match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener.local_addr().unwrap().port(),
        Err(_) => {
            eprintln!("Skipping: cannot bind to localhost");
            return;
        }
    };

    let backend =
        HttpBackend::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();
    let err = backend.merge(FileKey::new(), 1).await.unwrap_err();
    assert!(matches!(err, StorageError::Http(_)), "{err:?}");
}
