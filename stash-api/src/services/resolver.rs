//! Cache Resolution Engine
//!
//! Finds or creates the cache record for an object key, deletes records
//! that proved stale, and applies explicit upserts. The record store's
//! uniqueness guarantee arbitrates concurrent creates: the losing insert
//! adopts the winner's record.

use stash_core::{
    CacheEntry, CachePopulator, CacheStore, Location, ObjectKey, StashError, StashResult,
    StorageError,
};
use std::sync::Arc;

use crate::telemetry::with_metrics;

fn is_conflict(err: &StashError) -> bool {
    matches!(err, StashError::Storage(StorageError::Conflict { .. }))
}

/// Resolves object keys to cache records.
#[derive(Clone)]
pub struct CacheResolver {
    store: Arc<dyn CacheStore>,
    populator: Arc<dyn CachePopulator>,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn CacheStore>, populator: Arc<dyn CachePopulator>) -> Self {
        Self { store, populator }
    }

    /// The underlying record store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the existing record for `key`, or populate and persist one.
    ///
    /// `Ok(None)` when there is no record and population produced nothing.
    /// Population failures are logged and treated as "nothing produced";
    /// store failures propagate.
    pub async fn resolve(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        if let Some(entry) = self.store.get(key).await? {
            return Ok(Some(entry));
        }

        let location = match self.populator.populate(key).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                tracing::debug!(object_id = key.object_id, object_type = %key.object_type, "Nothing to populate");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(
                    object_id = key.object_id,
                    object_type = %key.object_type,
                    error = %e,
                    "Population failed"
                );
                return Ok(None);
            }
        };

        match self.store.insert(key, &location).await {
            Ok(entry) => {
                tracing::info!(
                    entry_id = entry.id,
                    object_id = key.object_id,
                    object_type = %key.object_type,
                    "Cache entry created"
                );
                Ok(Some(entry))
            }
            Err(e) if is_conflict(&e) => {
                tracing::debug!(
                    object_id = key.object_id,
                    object_type = %key.object_type,
                    "Concurrent resolve created the entry first"
                );
                self.store.get(key).await
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a record whose location proved stale. Never fails.
    pub async fn invalidate(&self, entry: &CacheEntry) {
        match self.store.delete(entry.id).await {
            Ok(_) => {
                with_metrics(|m| m.record_invalidation());
                tracing::info!(
                    entry_id = entry.id,
                    object_id = entry.object_id,
                    object_type = %entry.object_type,
                    "Cache entry invalidated"
                );
            }
            Err(e) => {
                tracing::error!(
                    entry_id = entry.id,
                    object_id = entry.object_id,
                    object_type = %entry.object_type,
                    error = %e,
                    "Failed to invalidate cache entry"
                );
            }
        }
    }

    /// Create the record for `key` or overwrite its location. Last write wins.
    pub async fn upsert(&self, key: &ObjectKey, location: &Location) -> StashResult<CacheEntry> {
        if let Some(existing) = self.store.get(key).await? {
            match self.store.update_location(existing.id, location).await {
                Ok(updated) => return Ok(updated),
                // Deleted between the read and the write: create it instead.
                Err(StashError::Storage(StorageError::NotFound { .. })) => {}
                Err(e) => return Err(e),
            }
        }

        match self.store.insert(key, location).await {
            Ok(created) => Ok(created),
            Err(e) if is_conflict(&e) => {
                let winner = self.store.get(key).await?.ok_or(e)?;
                self.store.update_location(winner.id, location).await
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the record for `key`, returning it if it existed.
    pub async fn remove(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        let removed = self.store.delete_by_key(key).await?;
        if let Some(entry) = &removed {
            tracing::info!(entry_id = entry.id, key = %key, "Cache entry deleted");
        }
        Ok(removed)
    }
}
