//! Files service client: streams stored files back and accepts uploads.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use stash_core::{Location, StashResult, StreamHandle, UpstreamError, UpstreamFetcher};
use std::io;
use std::time::Duration;

use super::{authorized, required_json, unavailable};
use crate::config::UpstreamEndpoint;
use crate::constants::FILES_SERVICE;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    chat_id: i64,
    message_id: i64,
}

/// Client for the files service.
#[derive(Debug, Clone)]
pub struct FilesClient {
    http: reqwest::Client,
    endpoint: UpstreamEndpoint,
    timeout: Duration,
}

impl FilesClient {
    pub fn new(http: reqwest::Client, endpoint: UpstreamEndpoint, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }

    fn download_url(&self, location: &Location) -> String {
        self.endpoint.join(&format!(
            "api/v1/files/download_by_message/{}/{}",
            location.chat_id, location.message_id
        ))
    }

    /// Upload a file with its caption and return where it was stored.
    pub async fn upload(&self, filename: &str, data: Bytes, caption: &str) -> StashResult<Location> {
        let part = Part::bytes(data.to_vec()).file_name(filename.to_string());
        let form = Form::new()
            .part("file", part)
            .text("caption", caption.to_string());

        let request = self
            .http
            .post(self.endpoint.join("api/v1/files/upload/"))
            .multipart(form)
            .timeout(self.timeout);

        let response = authorized(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| unavailable(FILES_SERVICE, e))?;

        let uploaded: UploadResponse = required_json(FILES_SERVICE, response).await?;
        tracing::debug!(
            chat_id = uploaded.chat_id,
            message_id = uploaded.message_id,
            filename,
            "File uploaded"
        );
        Ok(Location::new(uploaded.chat_id, uploaded.message_id))
    }
}

#[async_trait]
impl UpstreamFetcher for FilesClient {
    /// Any answer other than success means the stored pointer is stale.
    /// Transport failures and header timeouts are reported as unavailable.
    async fn open(&self, location: &Location) -> Result<StreamHandle, UpstreamError> {
        let request = authorized(self.http.get(self.download_url(location)), &self.endpoint);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| unavailable(FILES_SERVICE, "timed out waiting for response"))?
            .map_err(|e| unavailable(FILES_SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Gone {
                reason: format!("files service answered {}", status),
            });
        }

        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(StreamHandle::new(body))
    }
}
