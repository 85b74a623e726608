//! Upstream HTTP Clients
//!
//! Thin `reqwest` clients for the three services the cache depends on:
//!
//! - `files`: stores uploaded files and streams them back by location
//! - `library`: book metadata and the paged catalog
//! - `downloader`: produces source file bytes and display filenames
//!
//! Every request carries the service's key in the `Authorization` header.

pub mod downloader;
pub mod files;
pub mod library;

pub use downloader::DownloaderClient;
pub use files::FilesClient;
pub use library::{Book, LibraryClient};

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use stash_core::{StashResult, UpstreamError};
use std::fmt;
use std::time::Duration;

use crate::config::UpstreamEndpoint;

/// Build the shared HTTP client. Only the connect phase is bounded here;
/// whole-request timeouts are set per call so streamed bodies are not cut.
pub fn build_http_client(timeout: Duration) -> StashResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(|e| {
            UpstreamError::Unavailable {
                service: "http".to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            }
            .into()
        })
}

/// Attach the service key.
pub(crate) fn authorized(request: RequestBuilder, endpoint: &UpstreamEndpoint) -> RequestBuilder {
    request.header(reqwest::header::AUTHORIZATION, endpoint.api_key.expose())
}

pub(crate) fn unavailable(service: &str, reason: impl fmt::Display) -> UpstreamError {
    UpstreamError::Unavailable {
        service: service.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn invalid_response(service: &str, reason: impl fmt::Display) -> UpstreamError {
    UpstreamError::InvalidResponse {
        service: service.to_string(),
        reason: reason.to_string(),
    }
}

/// Decode a JSON body. 404 means "no such object" and maps to `None`;
/// any other non-success status is an error.
pub(crate) async fn optional_json<T: DeserializeOwned>(
    service: &str,
    response: Response,
) -> Result<Option<T>, UpstreamError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(UpstreamError::BadStatus {
            service: service.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| invalid_response(service, e))
}

/// Decode a JSON body that must exist.
pub(crate) async fn required_json<T: DeserializeOwned>(
    service: &str,
    response: Response,
) -> Result<T, UpstreamError> {
    let status = response.status();
    optional_json(service, response)
        .await?
        .ok_or_else(|| UpstreamError::BadStatus {
            service: service.to_string(),
            status: status.as_u16(),
        })
}
