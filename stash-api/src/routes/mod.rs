//! REST API Routes Module
//!
//! - Cached file routes under /api/v1/* (API key required)
//! - Health checks at /healthcheck and /health/* (public)
//! - Metrics at /metrics (public, when enabled)
//! - OpenAPI spec at /openapi.json (with the `openapi` feature)

pub mod cached_file;
pub mod health;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::config::ServiceConfig;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware, TelemetryConfig};

pub use cached_file::{JobAccepted, UpsertCachedFileRequest};
pub use health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Cached file routes. Paths are absolute so that `POST /api/v1/` matches
/// with and without the trailing slash.
fn cached_file_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1", post(cached_file::upsert_cached_file))
        .route("/api/v1/", post(cached_file::upsert_cached_file))
        .route("/api/v1/update_cache", post(cached_file::update_cache))
        .route(
            "/api/v1/download/:object_id/:object_type",
            get(cached_file::download_cached_file),
        )
        .route(
            "/api/v1/:object_id/:object_type",
            get(cached_file::get_cached_file).delete(cached_file::delete_cached_file),
        )
}

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. Observability - tracing and metrics, sees rejected requests too
/// 2. Auth (only on /api/v1/*) - validates the API key
pub fn create_api_router(
    state: AppState,
    config: &ServiceConfig,
    telemetry: &TelemetryConfig,
) -> Router {
    let auth_state = AuthMiddlewareState::new(config.api_key.clone());

    let api_routes = cached_file_routes()
        .route_layer(from_fn_with_state(auth_state, auth_middleware));

    let mut router = Router::new()
        .merge(api_routes)
        .route("/healthcheck", get(health::healthcheck))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    if telemetry.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    router
        .with_state(state)
        .layer(from_fn(observability_middleware))
}
