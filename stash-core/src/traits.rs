//! Collaborator traits.
//!
//! The resolution engine and the retrieval orchestrator only ever talk to
//! these traits. Production implementations live in `stash-api` (Postgres and
//! HTTP clients), the in-memory store in `stash-storage`, and scripted fakes
//! in `stash-test-utils`.

use async_trait::async_trait;

use crate::{
    CacheEntry, CatalogPage, EntryId, FileName, Job, JobTicket, Location, ObjectKey,
    ObjectMetadata, StashResult, StreamHandle, UpstreamError,
};

/// Persistent cache records keyed by (object id, object type).
///
/// Implementations provide per-record atomicity and enforce at most one
/// record per key: `insert` on an existing key fails with
/// `StorageError::Conflict`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the record for a key.
    async fn get(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>>;

    /// Create a record for a key that has none.
    async fn insert(&self, key: &ObjectKey, location: &Location) -> StashResult<CacheEntry>;

    /// Overwrite the location of an existing record.
    async fn update_location(&self, id: EntryId, location: &Location) -> StashResult<CacheEntry>;

    /// Delete a record by surrogate id, returning it if it existed.
    async fn delete(&self, id: EntryId) -> StashResult<Option<CacheEntry>>;

    /// Delete the record for a key, returning it if it existed.
    async fn delete_by_key(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> StashResult<()>;
}

/// Opens byte streams for upstream locations.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Open the file behind `location`.
    ///
    /// Returns `UpstreamError::Gone` when the pointer no longer resolves.
    async fn open(&self, location: &Location) -> Result<StreamHandle, UpstreamError>;
}

/// Descriptive metadata lookup, used for response headers.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn metadata(&self, object_id: i32) -> StashResult<Option<ObjectMetadata>>;
}

/// Display filename lookup.
#[async_trait]
pub trait FilenameResolver: Send + Sync {
    async fn filename(&self, key: &ObjectKey) -> StashResult<Option<FileName>>;
}

/// Derives a fresh upstream location for a key that has no record.
#[async_trait]
pub trait CachePopulator: Send + Sync {
    /// `Ok(None)` means nothing could be produced for this key.
    async fn populate(&self, key: &ObjectKey) -> StashResult<Option<Location>>;
}

/// Paged listing of every object the cache may hold.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a 1-based page.
    async fn page(&self, page: u32, size: u32) -> StashResult<CatalogPage>;
}

/// One-way job submission. Never waits for the job to run.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job) -> StashResult<JobTicket>;
}
