//! OpenAPI document for the Stash API
//!
//! Generated by utoipa from route annotations and schema derives.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{cached_file, health};
use crate::routes::{
    ComponentHealth, HealthDetails, HealthResponse, HealthStatus, JobAccepted,
    UpsertCachedFileRequest,
};
use crate::telemetry::metrics;

use stash_core::{CacheEntry, Job, JobTicket, Location, ObjectKey};

/// OpenAPI document for the Stash API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stash API",
        description = "Resolves, refreshes and streams files cached in upstream storage",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Cached Files", description = "Cache records and file downloads"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        cached_file::get_cached_file,
        cached_file::delete_cached_file,
        cached_file::download_cached_file,
        cached_file::upsert_cached_file,
        cached_file::update_cache,

        health::healthcheck,
        health::liveness,
        health::readiness,

        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            CacheEntry, Location, ObjectKey, Job, JobTicket,
            UpsertCachedFileRequest, JobAccepted,
            HealthResponse, HealthStatus, HealthDetails, ComponentHealth
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier for OpenAPI document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // The raw key goes in Authorization, without a scheme prefix.
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
