//! Stash Storage - In-Memory Cache Record Store
//!
//! A `CacheStore` backed by a map behind a tokio `RwLock`. Used by the test
//! suites and by the API's in-memory mode. The Postgres store lives in
//! `stash-api::db`.

use async_trait::async_trait;
use stash_core::{
    CacheEntry, CacheStore, EntryId, Location, ObjectKey, StashResult, StorageError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Records {
    next_id: EntryId,
    entries: HashMap<EntryId, CacheEntry>,
    by_key: HashMap<ObjectKey, EntryId>,
}

impl Records {
    fn remove(&mut self, id: EntryId) -> Option<CacheEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_key.remove(&entry.key());
        Some(entry)
    }
}

/// In-memory cache record store.
///
/// Cloning shares the underlying records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.entries.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of all records ordered by id.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let records = self.records.read().await;
        let mut entries: Vec<CacheEntry> = records.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        let records = self.records.read().await;
        Ok(records
            .by_key
            .get(key)
            .and_then(|id| records.entries.get(id))
            .cloned())
    }

    async fn insert(&self, key: &ObjectKey, location: &Location) -> StashResult<CacheEntry> {
        let mut records = self.records.write().await;
        if records.by_key.contains_key(key) {
            return Err(StorageError::Conflict {
                object_id: key.object_id,
                object_type: key.object_type.clone(),
            }
            .into());
        }

        records.next_id += 1;
        let entry = CacheEntry {
            id: records.next_id,
            object_id: key.object_id,
            object_type: key.object_type.clone(),
            location: *location,
        };
        records.by_key.insert(key.clone(), entry.id);
        records.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_location(&self, id: EntryId, location: &Location) -> StashResult<CacheEntry> {
        let mut records = self.records.write().await;
        let entry = records
            .entries
            .get_mut(&id)
            .ok_or(StorageError::NotFound { id })?;
        entry.location = *location;
        Ok(entry.clone())
    }

    async fn delete(&self, id: EntryId) -> StashResult<Option<CacheEntry>> {
        Ok(self.records.write().await.remove(id))
    }

    async fn delete_by_key(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        let mut records = self.records.write().await;
        let Some(id) = records.by_key.get(key).copied() else {
            return Ok(None);
        };
        Ok(records.remove(id))
    }

    async fn health_check(&self) -> StashResult<()> {
        Ok(())
    }
}
