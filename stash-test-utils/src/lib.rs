//! Stash Test Utilities
//!
//! Shared test infrastructure for the Stash workspace:
//! - Scripted collaborators with call counters
//! - Proptest generators for keys and locations
//! - Fixtures for common scenarios
//! - Assertions over stream release accounting

pub use stash_storage::InMemoryCacheStore;

pub use stash_core::{
    CacheEntry, CachePopulator, CacheStore, Catalog, CatalogItem, CatalogPage, EntryId, FileName,
    FilenameResolver, Job, JobQueue, JobTicket, Location, MetadataResolver, ObjectKey,
    ObjectMetadata, QueueError, StashError, StashResult, StorageError, StreamHandle,
    UpstreamError, UpstreamFetcher,
};

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// In-memory store that counts calls and can inject failures or races.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryCacheStore,
    gets: AtomicUsize,
    inserts: AtomicUsize,
    deletes: AtomicUsize,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    competing_insert: Mutex<Option<Location>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store, for seeding and inspection.
    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    /// Insert a record directly, bypassing the counters.
    pub async fn seed(&self, key: &ObjectKey, location: Location) -> CacheEntry {
        match self.inner.insert(key, &location).await {
            Ok(entry) => entry,
            Err(e) => panic!("seeding {} failed: {}", key, e),
        }
    }

    /// Make the next `insert` lose a race: a competing record with
    /// `location` is written first, so the call fails with `Conflict`.
    pub fn lose_next_insert_to(&self, location: Location) {
        *lock(&self.competing_insert) = Some(location);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Deletes by id, which is what invalidation uses.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

fn unavailable() -> StashError {
    StorageError::Unavailable {
        reason: "scripted outage".to_string(),
    }
    .into()
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get(key).await
    }

    async fn insert(&self, key: &ObjectKey, location: &Location) -> StashResult<CacheEntry> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let competitor = lock(&self.competing_insert).take();
        if let Some(competitor) = competitor {
            self.inner.insert(key, &competitor).await?;
        }
        self.inner.insert(key, location).await
    }

    async fn update_location(&self, id: EntryId, location: &Location) -> StashResult<CacheEntry> {
        self.inner.update_location(id, location).await
    }

    async fn delete(&self, id: EntryId) -> StashResult<Option<CacheEntry>> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.delete(id).await
    }

    async fn delete_by_key(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        self.inner.delete_by_key(key).await
    }

    async fn health_check(&self) -> StashResult<()> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

// ============================================================================
// UPSTREAM FETCHER
// ============================================================================

/// How the scripted fetcher answers for a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScript {
    Live(Bytes),
    Gone,
    Unavailable,
}

/// Fetcher answering from a per-location script. Unscripted locations are
/// gone. Every handle it returns counts its release.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<Location, FetchScript>>,
    opened: Mutex<Vec<Location>>,
    streams: AtomicUsize,
    releases: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(self, location: Location, data: impl Into<Bytes>) -> Self {
        self.script(location, FetchScript::Live(data.into()));
        self
    }

    pub fn gone(self, location: Location) -> Self {
        self.script(location, FetchScript::Gone);
        self
    }

    pub fn unavailable(self, location: Location) -> Self {
        self.script(location, FetchScript::Unavailable);
        self
    }

    pub fn script(&self, location: Location, script: FetchScript) {
        lock(&self.scripts).insert(location, script);
    }

    /// Every `open` call, in order.
    pub fn opened(&self) -> Vec<Location> {
        lock(&self.opened).clone()
    }

    pub fn opens(&self) -> usize {
        lock(&self.opened).len()
    }

    /// Handles actually handed out.
    pub fn streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    /// Handles released so far.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn open(&self, location: &Location) -> Result<StreamHandle, UpstreamError> {
        lock(&self.opened).push(*location);
        let script = lock(&self.scripts).get(location).cloned();

        match script {
            Some(FetchScript::Live(data)) => {
                self.streams.fetch_add(1, Ordering::SeqCst);
                let releases = self.releases.clone();
                Ok(StreamHandle::from_bytes(data).on_release(move || {
                    releases.fetch_add(1, Ordering::SeqCst);
                }))
            }
            Some(FetchScript::Unavailable) => Err(UpstreamError::Unavailable {
                service: "files".to_string(),
                reason: "scripted timeout".to_string(),
            }),
            Some(FetchScript::Gone) | None => Err(UpstreamError::Gone {
                reason: format!("no file at {}/{}", location.chat_id, location.message_id),
            }),
        }
    }
}

// ============================================================================
// POPULATOR
// ============================================================================

/// One scripted answer of the populator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateScript {
    Produce(Location),
    Nothing,
    Fail,
}

/// Populator answering from a queue. Once the queue is drained it produces
/// nothing.
#[derive(Debug, Default)]
pub struct ScriptedPopulator {
    answers: Mutex<VecDeque<PopulateScript>>,
    calls: AtomicUsize,
}

impl ScriptedPopulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producing(locations: impl IntoIterator<Item = Location>) -> Self {
        let populator = Self::new();
        for location in locations {
            populator.push(PopulateScript::Produce(location));
        }
        populator
    }

    pub fn push(&self, answer: PopulateScript) {
        lock(&self.answers).push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CachePopulator for ScriptedPopulator {
    async fn populate(&self, key: &ObjectKey) -> StashResult<Option<Location>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.answers).pop_front() {
            Some(PopulateScript::Produce(location)) => Ok(Some(location)),
            Some(PopulateScript::Fail) => Err(UpstreamError::Unavailable {
                service: "library".to_string(),
                reason: format!("scripted failure for {}", key),
            }
            .into()),
            Some(PopulateScript::Nothing) | None => Ok(None),
        }
    }
}

// ============================================================================
// METADATA AND FILENAMES
// ============================================================================

/// Scripted answer for a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    Fail,
}

fn lookup_result<T: Clone>(lookup: &Lookup<T>, service: &str) -> StashResult<Option<T>> {
    match lookup {
        Lookup::Found(value) => Ok(Some(value.clone())),
        Lookup::Missing => Ok(None),
        Lookup::Fail => Err(UpstreamError::BadStatus {
            service: service.to_string(),
            status: 500,
        }
        .into()),
    }
}

/// Metadata resolver returning the same answer for every object.
#[derive(Debug)]
pub struct StaticMetadata {
    answer: Lookup<ObjectMetadata>,
    calls: AtomicUsize,
}

impl StaticMetadata {
    pub fn new(answer: Lookup<ObjectMetadata>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for StaticMetadata {
    async fn metadata(&self, _object_id: i32) -> StashResult<Option<ObjectMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lookup_result(&self.answer, "library")
    }
}

/// Filename resolver returning the same answer for every key.
#[derive(Debug)]
pub struct StaticFilenames {
    answer: Lookup<FileName>,
    calls: AtomicUsize,
}

impl StaticFilenames {
    pub fn new(answer: Lookup<FileName>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilenameResolver for StaticFilenames {
    async fn filename(&self, _key: &ObjectKey) -> StashResult<Option<FileName>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lookup_result(&self.answer, "downloader")
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Catalog serving a fixed item list in pages of the requested size.
#[derive(Debug, Default)]
pub struct PagedCatalog {
    items: Vec<CatalogItem>,
    failing_page: Option<u32>,
    requested: Mutex<Vec<u32>>,
}

impl PagedCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Fail whenever `page` is requested.
    pub fn failing_on(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    /// Pages requested so far, in order.
    pub fn requested(&self) -> Vec<u32> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl Catalog for PagedCatalog {
    async fn page(&self, page: u32, size: u32) -> StashResult<CatalogPage> {
        lock(&self.requested).push(page);
        if self.failing_page == Some(page) {
            return Err(UpstreamError::BadStatus {
                service: "library".to_string(),
                status: 503,
            }
            .into());
        }

        let size = size.max(1) as usize;
        let pages = self.items.len().div_ceil(size).max(1) as u32;
        let start = (page.saturating_sub(1) as usize) * size;
        let items = self.items.iter().skip(start).take(size).cloned().collect();

        Ok(CatalogPage { items, page, pages })
    }
}

// ============================================================================
// JOB QUEUE
// ============================================================================

/// Job queue that records tickets instead of running them.
#[derive(Debug, Default)]
pub struct RecordingJobQueue {
    tickets: Mutex<Vec<JobTicket>>,
    full: AtomicBool,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject further jobs as if the queue were at capacity.
    pub fn set_full(&self, full: bool) {
        self.full.store(full, Ordering::SeqCst);
    }

    pub fn tickets(&self) -> Vec<JobTicket> {
        lock(&self.tickets).clone()
    }
}

impl JobQueue for RecordingJobQueue {
    fn enqueue(&self, job: Job) -> StashResult<JobTicket> {
        if self.full.load(Ordering::SeqCst) {
            return Err(QueueError::Full.into());
        }
        let ticket = JobTicket::new(job);
        lock(&self.tickets).push(ticket.clone());
        Ok(ticket)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Stash identity types.

    use super::*;
    use proptest::prelude::*;

    /// Object types the upstream library offers.
    pub fn arb_object_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("fb2".to_string()),
            Just("epub".to_string()),
            Just("mobi".to_string()),
            Just("pdf".to_string()),
            "[a-z]{2,8}",
        ]
    }

    pub fn arb_object_key() -> impl Strategy<Value = ObjectKey> {
        (1i32..1_000_000, arb_object_type()).prop_map(|(id, kind)| ObjectKey::new(id, kind))
    }

    pub fn arb_location() -> impl Strategy<Value = Location> {
        (any::<i64>(), 1i64..i64::MAX).prop_map(|(chat, message)| Location::new(chat, message))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn fb2(object_id: i32) -> ObjectKey {
        ObjectKey::new(object_id, "fb2")
    }

    /// A location in the fixture chat.
    pub fn location(message_id: i64) -> Location {
        Location::new(-1_000_000_000_001, message_id)
    }

    pub fn metadata(object_id: i32) -> ObjectMetadata {
        ObjectMetadata {
            object_id,
            title: "Мастер и Маргарита".to_string(),
            authors: vec!["Булгаков Михаил Афанасьевич".to_string()],
        }
    }

    pub fn filename() -> String {
        "Bulgakov_Master_i_Margarita.fb2".to_string()
    }

    /// Downloader answer for [`filename`], without a transliteration.
    pub fn file_name() -> FileName {
        FileName::new(filename())
    }

    /// Downloader answer for a Cyrillic name with its transliteration.
    pub fn cyrillic_file_name() -> FileName {
        FileName::new("Булгаков_Мастер_и_Маргарита.fb2").with_ascii(filename())
    }

    pub fn catalog_item(id: i32, types: &[&str]) -> CatalogItem {
        CatalogItem {
            id,
            available_types: types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over scripted collaborator accounting.

    use super::*;

    /// Every stream handed out has been released exactly once.
    #[track_caller]
    pub fn assert_streams_balanced(fetcher: &ScriptedFetcher) {
        assert_eq!(
            fetcher.streams(),
            fetcher.releases(),
            "opened {} streams but released {}",
            fetcher.streams(),
            fetcher.releases()
        );
    }

    #[track_caller]
    pub fn assert_storage_conflict<T: std::fmt::Debug>(result: &StashResult<T>) {
        match result {
            Err(StashError::Storage(StorageError::Conflict { .. })) => {}
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
