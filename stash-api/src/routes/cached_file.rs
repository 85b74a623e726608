//! Cached File REST API Routes
//!
//! Lookup, delete, upsert, and streaming download of cached files, plus the
//! trigger for a full cache refresh.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use stash_core::{CacheEntry, Job, JobQueue, Location, ObjectKey};
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::{HEADER_CAPTION_B64, HEADER_FILENAME_B64};
use crate::error::{ApiError, ApiResult};
use crate::services::{CacheResolver, Download, Retrieval, RetrievalOrchestrator};

// ============================================================================
// TYPES
// ============================================================================

/// Body of `POST /api/v1/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpsertCachedFileRequest {
    pub object_id: i32,
    pub object_type: String,
    /// Upstream location to store for the key
    pub data: Location,
}

/// Acknowledgement for an accepted background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct JobAccepted {
    pub status: String,
    pub job_id: Uuid,
}

// ============================================================================
// RESPONSE PACKAGING
// ============================================================================

fn header_value(value: String) -> Option<HeaderValue> {
    HeaderValue::from_str(&value).ok()
}

impl IntoResponse for Download {
    fn into_response(self) -> Response {
        let Download {
            stream,
            filename,
            filename_ascii,
            caption,
        } = self;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(
            CONTENT_DISPOSITION,
            header_value(format!("attachment; filename=\"{}\"", filename_ascii))
                .unwrap_or_else(|| HeaderValue::from_static("attachment")),
        );
        if let Some(value) = header_value(STANDARD.encode(filename.as_bytes())) {
            headers.insert(HeaderName::from_static(HEADER_FILENAME_B64), value);
        }
        if let Some(value) = header_value(STANDARD.encode(caption.as_bytes())) {
            headers.insert(HeaderName::from_static(HEADER_CAPTION_B64), value);
        }

        // The body owns the handle; dropping the response releases the stream.
        (StatusCode::OK, headers, Body::from_stream(stream)).into_response()
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/{object_id}/{object_type} - Resolve (and populate) a cached file
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/{object_id}/{object_type}",
    tag = "Cached Files",
    params(
        ("object_id" = i32, Path, description = "External object id"),
        ("object_type" = String, Path, description = "Object type"),
    ),
    responses(
        (status = 200, description = "Cache entry", body = CacheEntry),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "No entry and nothing to populate", body = ApiError),
    ),
    security(("api_key" = []))
))]
pub async fn get_cached_file(
    State(resolver): State<CacheResolver>,
    Path((object_id, object_type)): Path<(i32, String)>,
) -> ApiResult<Json<CacheEntry>> {
    let key = ObjectKey::new(object_id, object_type);
    resolver
        .resolve(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::cached_file_not_found(&key))
}

/// DELETE /api/v1/{object_id}/{object_type} - Delete a cached file record
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/v1/{object_id}/{object_type}",
    tag = "Cached Files",
    params(
        ("object_id" = i32, Path, description = "External object id"),
        ("object_type" = String, Path, description = "Object type"),
    ),
    responses(
        (status = 200, description = "Deleted entry", body = CacheEntry),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "No such entry", body = ApiError),
    ),
    security(("api_key" = []))
))]
pub async fn delete_cached_file(
    State(resolver): State<CacheResolver>,
    Path((object_id, object_type)): Path<(i32, String)>,
) -> ApiResult<Json<CacheEntry>> {
    let key = ObjectKey::new(object_id, object_type);
    resolver
        .remove(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::cached_file_not_found(&key))
}

/// GET /api/v1/download/{object_id}/{object_type} - Stream a cached file
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/download/{object_id}/{object_type}",
    tag = "Cached Files",
    params(
        ("object_id" = i32, Path, description = "External object id"),
        ("object_type" = String, Path, description = "Object type"),
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream",
            headers(
                ("content-disposition" = String, description = "attachment; filename=\"<ascii name>\""),
                ("x-filename-b64" = String, description = "Base64 of the UTF-8 filename"),
                ("x-caption-b64" = String, description = "Base64 of the caption"),
            )),
        (status = 204, description = "Entry exists but nothing can be delivered"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "No entry and nothing to populate", body = ApiError),
    ),
    security(("api_key" = []))
))]
pub async fn download_cached_file(
    State(retrieval): State<RetrievalOrchestrator>,
    Path((object_id, object_type)): Path<(i32, String)>,
) -> Response {
    let key = ObjectKey::new(object_id, object_type);
    match retrieval.retrieve(&key).await {
        Retrieval::Ready(download) => download.into_response(),
        Retrieval::Empty => StatusCode::NO_CONTENT.into_response(),
        Retrieval::NotFound => ApiError::cached_file_not_found(&key).into_response(),
    }
}

/// POST /api/v1/ - Create or overwrite a cached file record
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/",
    tag = "Cached Files",
    request_body = UpsertCachedFileRequest,
    responses(
        (status = 200, description = "Created or updated entry", body = CacheEntry),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
))]
pub async fn upsert_cached_file(
    State(resolver): State<CacheResolver>,
    Json(req): Json<UpsertCachedFileRequest>,
) -> ApiResult<Json<CacheEntry>> {
    if req.object_type.trim().is_empty() {
        return Err(ApiError::missing_field("object_type"));
    }

    let key = ObjectKey::new(req.object_id, req.object_type);
    let entry = resolver.upsert(&key, &req.data).await?;
    Ok(Json(entry))
}

/// POST /api/v1/update_cache - Queue a full cache refresh
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/update_cache",
    tag = "Cached Files",
    responses(
        (status = 202, description = "Refresh queued", body = JobAccepted),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 503, description = "Job queue full", body = ApiError),
    ),
    security(("api_key" = []))
))]
pub async fn update_cache(
    State(jobs): State<Arc<dyn JobQueue>>,
) -> ApiResult<impl IntoResponse> {
    let ticket = jobs.enqueue(Job::RefreshAll)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            status: "queued".to_string(),
            job_id: ticket.job_id,
        }),
    ))
}
