//! Shared wiring for the stash-api integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use stash_api::{CacheResolver, RetrievalOrchestrator};
use stash_test_utils::{
    fixtures, CountingStore, Lookup, ScriptedFetcher, ScriptedPopulator, StaticFilenames,
    StaticMetadata,
};

/// Scripted collaborators plus the services built on top of them.
pub struct Harness {
    pub store: Arc<CountingStore>,
    pub populator: Arc<ScriptedPopulator>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub filenames: Arc<StaticFilenames>,
    pub metadata: Arc<StaticMetadata>,
}

impl Harness {
    /// Filename and metadata lookups succeed unless overridden.
    pub fn new(fetcher: ScriptedFetcher, populator: ScriptedPopulator) -> Self {
        Self {
            store: Arc::new(CountingStore::new()),
            populator: Arc::new(populator),
            fetcher: Arc::new(fetcher),
            filenames: Arc::new(StaticFilenames::new(Lookup::Found(fixtures::file_name()))),
            metadata: Arc::new(StaticMetadata::new(Lookup::Found(fixtures::metadata(1)))),
        }
    }

    pub fn with_filenames(mut self, answer: Lookup<stash_core::FileName>) -> Self {
        self.filenames = Arc::new(StaticFilenames::new(answer));
        self
    }

    pub fn with_metadata(mut self, answer: Lookup<stash_core::ObjectMetadata>) -> Self {
        self.metadata = Arc::new(StaticMetadata::new(answer));
        self
    }

    pub fn resolver(&self) -> CacheResolver {
        CacheResolver::new(self.store.clone(), self.populator.clone())
    }

    pub fn orchestrator(&self) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(
            self.resolver(),
            self.fetcher.clone(),
            self.filenames.clone(),
            self.metadata.clone(),
        )
    }
}

pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => panic!("failed to build test runtime: {}", e),
    }
}
