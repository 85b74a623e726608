//! Downloader service client: source file bytes and display filenames.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use stash_core::{FileName, FilenameResolver, ObjectKey, StashResult, UpstreamError};
use std::time::Duration;

use super::{authorized, optional_json, unavailable};
use crate::config::UpstreamEndpoint;
use crate::constants::DOWNLOADER_SERVICE;

/// Client for the downloader service.
#[derive(Debug, Clone)]
pub struct DownloaderClient {
    http: reqwest::Client,
    endpoint: UpstreamEndpoint,
    timeout: Duration,
}

impl DownloaderClient {
    pub fn new(http: reqwest::Client, endpoint: UpstreamEndpoint, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }

    /// Download the source file of a book. `Ok(None)` when the source has
    /// no file of this type.
    pub async fn download(
        &self,
        source_id: i32,
        remote_id: i32,
        object_type: &str,
    ) -> StashResult<Option<Bytes>> {
        let url = self
            .endpoint
            .join(&format!("download/{}/{}/{}", source_id, remote_id, object_type));
        let request = self.http.get(url).timeout(self.timeout);

        let response = authorized(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| unavailable(DOWNLOADER_SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(UpstreamError::BadStatus {
                service: DOWNLOADER_SERVICE.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| unavailable(DOWNLOADER_SERVICE, e))?;
        Ok(Some(data))
    }
}

#[async_trait]
impl FilenameResolver for DownloaderClient {
    async fn filename(&self, key: &ObjectKey) -> StashResult<Option<FileName>> {
        let url = self
            .endpoint
            .join(&format!("filename/{}/{}", key.object_id, key.object_type));
        let request = self.http.get(url).timeout(self.timeout);

        let response = authorized(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| unavailable(DOWNLOADER_SERVICE, e))?;

        let body: Option<FileName> = optional_json(DOWNLOADER_SERVICE, response).await?;
        Ok(body.filter(|name| !name.filename.is_empty()))
    }
}
