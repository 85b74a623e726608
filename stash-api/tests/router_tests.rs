//! HTTP surface tests driven through the full router with `tower::oneshot`.

mod support;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use stash_api::telemetry::TelemetryConfig;
use stash_api::{create_api_router, AppState, ServiceConfig, ServiceKey};
use stash_test_utils::{fixtures, CacheStore, RecordingJobQueue, ScriptedFetcher, ScriptedPopulator};
use support::Harness;
use tower::ServiceExt;

const KEY: &str = "test-service-key";

struct TestApp {
    router: Router,
    harness: Harness,
    jobs: Arc<RecordingJobQueue>,
}

fn app(fetcher: ScriptedFetcher, populator: ScriptedPopulator) -> TestApp {
    let harness = Harness::new(fetcher, populator);
    let jobs = Arc::new(RecordingJobQueue::new());
    let state = AppState::new(harness.orchestrator(), jobs.clone());

    let config = ServiceConfig {
        api_key: ServiceKey::new(KEY),
        ..ServiceConfig::default()
    };
    let telemetry = TelemetryConfig {
        metrics_enabled: true,
        ..TelemetryConfig::default()
    };

    TestApp {
        router: create_api_router(state, &config, &telemetry),
        harness,
        jobs,
    }
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, KEY)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_healthcheck_is_public() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());
    let req = Request::get("/healthcheck").body(Body::empty()).unwrap();

    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Ok!");
}

#[tokio::test]
async fn test_readiness_reports_store_health() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());
    let req = Request::get("/health/ready").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "healthy");

    t.harness.store.fail_gets(true);
    let req = Request::get("/health/ready").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(&body)["status"], "unhealthy");
}

#[tokio::test]
async fn test_api_requires_the_service_key() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let missing = Request::get("/api/v1/1/fb2").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, missing).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["code"], "UNAUTHORIZED");

    let wrong = Request::get("/api/v1/download/1/fb2")
        .header(header::AUTHORIZATION, "Bearer test-service-key")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.router, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Rejected before any work is done.
    assert_eq!(t.harness.populator.calls(), 0);
    assert_eq!(t.harness.store.gets(), 0);
}

#[tokio::test]
async fn test_unset_service_key_rejects_everything() {
    let harness = Harness::new(ScriptedFetcher::new(), ScriptedPopulator::new());
    let state = AppState::new(harness.orchestrator(), Arc::new(RecordingJobQueue::new()));
    let router = create_api_router(state, &ServiceConfig::default(), &TelemetryConfig::default());

    let missing = Request::delete("/api/v1/1/fb2").body(Body::empty()).unwrap();
    let (status, _, _) = send(&router, missing).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let blank = Request::delete("/api/v1/1/fb2")
        .header(header::AUTHORIZATION, "")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&router, blank).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(harness.store.deletes(), 0);
}

#[tokio::test]
async fn test_get_cached_file() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());
    let entry = t.harness.store.seed(&fixtures::fb2(5), fixtures::location(50)).await;

    let req = request(Method::GET, "/api/v1/5/fb2").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::OK);
    let json = json_body(&body);
    assert_eq!(json["id"], entry.id);
    assert_eq!(json["object_id"], 5);
    assert_eq!(json["object_type"], "fb2");
    assert_eq!(json["chat_id"], fixtures::location(50).chat_id);
    assert_eq!(json["message_id"], 50);
}

#[tokio::test]
async fn test_get_populates_missing_entry() {
    let t = app(
        ScriptedFetcher::new(),
        ScriptedPopulator::producing([fixtures::location(60)]),
    );

    let req = request(Method::GET, "/api/v1/6/epub").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["message_id"], 60);
    assert_eq!(t.harness.populator.calls(), 1);
}

#[tokio::test]
async fn test_get_unknown_is_not_found() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let req = request(Method::GET, "/api/v1/7/fb2").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["code"], "CACHED_FILE_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_cached_file() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());
    t.harness.store.seed(&fixtures::fb2(8), fixtures::location(80)).await;

    let req = request(Method::DELETE, "/api/v1/8/fb2").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["message_id"], 80);

    let req = request(Method::DELETE, "/api/v1/8/fb2").body(Body::empty()).unwrap();
    let (status, _, _) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_with_and_without_trailing_slash() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let create = json!({
        "object_id": 9,
        "object_type": "fb2",
        "data": { "chat_id": -42, "message_id": 1 }
    });
    let req = request(Method::POST, "/api/v1/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(create.to_string()))
        .unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    let created = json_body(&body);

    let update = json!({
        "object_id": 9,
        "object_type": "fb2",
        "data": { "chat_id": -42, "message_id": 2 }
    });
    let req = request(Method::POST, "/api/v1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(update.to_string()))
        .unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    let updated = json_body(&body);

    assert_eq!(created["id"], updated["id"]);
    assert_eq!(updated["message_id"], 2);

    let stored = t.harness.store.get(&fixtures::fb2(9)).await.unwrap().unwrap();
    assert_eq!(stored.location.message_id, 2);
}

#[tokio::test]
async fn test_upsert_rejects_blank_type() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let body = json!({
        "object_id": 9,
        "object_type": " ",
        "data": { "chat_id": 1, "message_id": 1 }
    });
    let req = request(Method::POST, "/api/v1/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], "MISSING_FIELD");
}

#[tokio::test]
async fn test_download_streams_with_headers() {
    let t = app(
        ScriptedFetcher::new().live(fixtures::location(100), "book contents"),
        ScriptedPopulator::new(),
    );
    t.harness.store.seed(&fixtures::fb2(10), fixtures::location(100)).await;

    let req = request(Method::GET, "/api/v1/download/10/fb2").body(Body::empty()).unwrap();
    let (status, headers, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"book contents");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}\"", fixtures::filename()).as_str()
    );

    let filename = STANDARD.decode(headers["x-filename-b64"].as_bytes()).unwrap();
    assert_eq!(String::from_utf8(filename).unwrap(), fixtures::filename());
    let caption = STANDARD.decode(headers["x-caption-b64"].as_bytes()).unwrap();
    assert!(String::from_utf8(caption).unwrap().starts_with("Мастер и Маргарита"));

    assert_eq!(t.harness.fetcher.releases(), 1);
}

#[tokio::test]
async fn test_download_with_stale_pointers_is_no_content() {
    let t = app(
        ScriptedFetcher::new()
            .gone(fixtures::location(110))
            .gone(fixtures::location(111)),
        ScriptedPopulator::producing([fixtures::location(111)]),
    );
    t.harness.store.seed(&fixtures::fb2(11), fixtures::location(110)).await;

    let req = request(Method::GET, "/api/v1/download/11/fb2").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(t.harness.store.deletes(), 1);
}

#[tokio::test]
async fn test_download_unknown_is_not_found() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let req = request(Method::GET, "/api/v1/download/12/fb2").body(Body::empty()).unwrap();
    let (status, _, _) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_cache_queues_a_refresh() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let req = request(Method::POST, "/api/v1/update_cache").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let json = json_body(&body);
    assert_eq!(json["status"], "queued");

    let tickets = t.jobs.tickets();
    assert_eq!(tickets.len(), 1);
    assert_eq!(json["job_id"], tickets[0].job_id.to_string());
}

#[tokio::test]
async fn test_update_cache_when_queue_full() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());
    t.jobs.set_full(true);

    let req = request(Method::POST, "/api/v1/update_cache").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(&body)["code"], "QUEUE_FULL");
}

#[tokio::test]
async fn test_metrics_and_openapi_are_public() {
    let t = app(ScriptedFetcher::new(), ScriptedPopulator::new());

    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let (status, _, _) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::get("/openapi.json").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json_body(&body)["paths"]["/api/v1/update_cache"].is_object());
}
