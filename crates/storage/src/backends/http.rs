//! Remote merge service reached over HTTP.
//!
//! The service accepts JSON bodies on `POST <endpoint>/merge` and
//! `POST <endpoint>/delete` and answers with a [`MergeReply`].

use crate::error::{StorageError, StorageResult};
use crate::traits::{MergeReply, StorageBackend};
use async_trait::async_trait;
use loft_core::FileKey;
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Serialize)]
struct MergeRequest {
    file_key: String,
    total_chunks: u32,
}

#[derive(Debug, Serialize)]
struct DeleteRequest {
    file_key: String,
}

/// HTTP storage backend.
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(endpoint: &str, timeout: Duration) -> StorageResult<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(StorageError::Config(
                "storage endpoint must not be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> StorageResult<MergeReply> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StorageError::Backend(format!("{status}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    #[instrument(skip(self), fields(backend = "http", file_key = %file_key))]
    async fn merge(&self, file_key: FileKey, total_chunks: u32) -> StorageResult<MergeReply> {
        let req = MergeRequest {
            file_key: file_key.to_string(),
            total_chunks,
        };
        self.send_json(self.http.post(self.url("merge")).json(&req))
            .await
    }

    #[instrument(skip(self), fields(backend = "http", file_key = %file_key))]
    async fn delete(&self, file_key: FileKey) -> StorageResult<MergeReply> {
        let req = DeleteRequest {
            file_key: file_key.to_string(),
        };
        self.send_json(self.http.post(self.url("delete")).json(&req))
            .await
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://storage:7070/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.url("merge"), "http://storage:7070/merge");
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            HttpBackend::new("/", Duration::from_secs(1)),
            Err(StorageError::Config(_))
        ));
    }
}
