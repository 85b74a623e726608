//! Stash API Server Entry Point
//!
//! Bootstraps configuration, the record store and upstream clients, starts
//! the refresh worker, and serves the Axum router until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use stash_api::telemetry::{init_tracer, TelemetryConfig};
use stash_api::{
    build_http_client, create_api_router, job_worker_task, ApiError, ApiResult, AppState,
    CacheRefresher, CacheResolver, DbClient, DbConfig, DownloaderClient, FilesClient,
    LibraryClient, LocalJobQueue, RetrievalOrchestrator, ServiceConfig, UpstreamPopulator,
};
use stash_core::CacheStore;
use stash_storage::InMemoryCacheStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = ServiceConfig::from_env()?;
    config.validate_for_production()?;

    // `STASH_STORAGE=memory` runs without Postgres; records vanish on exit.
    let in_memory = std::env::var("STASH_STORAGE").is_ok_and(|v| v == "memory");
    let db = if in_memory {
        tracing::warn!("Using in-memory record store");
        None
    } else {
        let db = DbClient::from_config(&DbConfig::from_env())?;
        db.ensure_schema().await?;
        Some(db)
    };
    let store: Arc<dyn CacheStore> = match &db {
        Some(db) => Arc::new(db.clone()),
        None => Arc::new(InMemoryCacheStore::new()),
    };

    let http = build_http_client(config.upstream_timeout)?;
    let timeout = config.upstream_timeout;
    let library = LibraryClient::new(http.clone(), config.library.clone(), timeout);
    let downloader = DownloaderClient::new(http.clone(), config.downloader.clone(), timeout);
    let files = FilesClient::new(http, config.files.clone(), timeout);

    let populator = Arc::new(UpstreamPopulator::new(
        library.clone(),
        downloader.clone(),
        files.clone(),
    ));
    let resolver = CacheResolver::new(store, populator);
    let retrieval = RetrievalOrchestrator::new(
        resolver.clone(),
        Arc::new(files),
        Arc::new(downloader),
        Arc::new(library.clone()),
    );
    let refresher = Arc::new(CacheRefresher::new(
        Arc::new(library),
        resolver,
        config.refresh_page_size,
    ));

    let (queue, job_rx) = LocalJobQueue::channel(config.job_queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(job_worker_task(refresher, job_rx, shutdown_rx));

    let state = AppState::new(retrieval, Arc::new(queue));
    let app = create_api_router(state, &config, &telemetry_config);

    let addr = resolve_bind_addr(&config)?;
    tracing::info!(%addr, environment = %config.environment, "Starting Stash API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Job worker panicked");
    }

    if let Some(db) = db {
        db.close();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
}

fn resolve_bind_addr(config: &ServiceConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", config.bind_host, config.port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
