//! Stash API - Cached File Resolve, Refresh and Stream Service
//!
//! REST layer (Axum) over a record store of cached files. Each record maps an
//! external object (id + type) to a location in upstream file storage.
//! Missing records are populated on demand from the library, downloader and
//! files services; stale locations are invalidated and re-resolved once
//! before a download gives up.

#[macro_use]
pub mod macros;

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod upstream;

// Re-export commonly used types
pub use config::{ServiceConfig, ServiceKey, UpstreamEndpoint};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{job_worker_task, LocalJobQueue};
pub use middleware::{auth_middleware, AuthMiddlewareState};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{
    CacheRefresher, CacheResolver, Download, RefreshReport, Retrieval, RetrievalOrchestrator,
    UpstreamPopulator,
};
pub use state::AppState;
pub use upstream::{build_http_client, DownloaderClient, FilesClient, LibraryClient};
