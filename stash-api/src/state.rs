//! Shared application state for Axum routers.

use stash_core::{CacheStore, JobQueue};
use std::sync::Arc;
use std::time::Instant;

use crate::services::{CacheResolver, RetrievalOrchestrator};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Record store, used directly by health checks.
    pub store: Arc<dyn CacheStore>,
    pub resolver: CacheResolver,
    pub retrieval: RetrievalOrchestrator,
    pub jobs: Arc<dyn JobQueue>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(retrieval: RetrievalOrchestrator, jobs: Arc<dyn JobQueue>) -> Self {
        let resolver = retrieval.resolver().clone();
        Self {
            store: resolver.store().clone(),
            resolver,
            retrieval,
            jobs,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<dyn CacheStore>, store);
crate::impl_from_ref!(CacheResolver, resolver);
crate::impl_from_ref!(RetrievalOrchestrator, retrieval);
crate::impl_from_ref!(Arc<dyn JobQueue>, jobs);
crate::impl_from_ref!(Instant, start_time);
