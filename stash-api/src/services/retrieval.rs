//! Streaming Retrieval Orchestrator
//!
//! Drives one download request:
//!
//! ```text
//! Resolving -> Fetching -> Streaming
//!                       -> Invalidating -> ReResolving -> ReFetching -> Streaming | Empty
//! Resolving -> NotFound
//! ```
//!
//! At most one invalidate-and-retry happens per request. Once a stream is
//! open it is owned by a [`StreamHandle`], so every exit path (handing it to
//! the transport, bailing out with `Empty`, client cancellation) releases it
//! exactly once.

use stash_core::{
    CacheEntry, FilenameResolver, MetadataResolver, ObjectKey, StreamHandle, UpstreamError,
    UpstreamFetcher,
};
use std::sync::Arc;

use super::resolver::CacheResolver;
use crate::telemetry::with_metrics;

/// A stream ready to be sent, with its response metadata.
#[derive(Debug)]
pub struct Download {
    pub stream: StreamHandle,
    /// UTF-8 display filename
    pub filename: String,
    /// Header-safe transliteration of `filename`
    pub filename_ascii: String,
    pub caption: String,
}

/// Outcome of a retrieval.
#[derive(Debug)]
pub enum Retrieval {
    Ready(Download),
    /// A record exists (or existed) but nothing can be delivered right now.
    Empty,
    /// No record exists and none could be created.
    NotFound,
}

impl Retrieval {
    pub fn outcome(&self) -> &'static str {
        match self {
            Retrieval::Ready(_) => "streamed",
            Retrieval::Empty => "empty",
            Retrieval::NotFound => "not_found",
        }
    }
}

/// Orchestrates resolve, fetch, retry, and packaging for downloads.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    resolver: CacheResolver,
    fetcher: Arc<dyn UpstreamFetcher>,
    filenames: Arc<dyn FilenameResolver>,
    metadata: Arc<dyn MetadataResolver>,
}

impl RetrievalOrchestrator {
    pub fn new(
        resolver: CacheResolver,
        fetcher: Arc<dyn UpstreamFetcher>,
        filenames: Arc<dyn FilenameResolver>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            filenames,
            metadata,
        }
    }

    pub fn resolver(&self) -> &CacheResolver {
        &self.resolver
    }

    /// Retrieve the file for `key`. Never fails: every collaborator error is
    /// folded into `Empty` here.
    #[tracing::instrument(skip(self, key), fields(object_id = key.object_id, object_type = %key.object_type))]
    pub async fn retrieve(&self, key: &ObjectKey) -> Retrieval {
        let retrieval = self.run(key).await;
        with_metrics(|m| m.record_retrieval(retrieval.outcome()));
        retrieval
    }

    async fn run(&self, key: &ObjectKey) -> Retrieval {
        let entry = match self.resolver.resolve(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Retrieval::NotFound,
            Err(e) => {
                tracing::error!(error = %e, "Resolve failed");
                return Retrieval::Empty;
            }
        };

        let stream = match self.open(&entry).await {
            Ok(stream) => stream,
            Err(e) if e.is_gone() => {
                tracing::info!(entry_id = entry.id, reason = %e, "Cached location is gone");
                match self.refetch(key, &entry).await {
                    Some(stream) => stream,
                    None => return Retrieval::Empty,
                }
            }
            Err(e) => {
                // Transient outage: keep the pointer.
                tracing::warn!(entry_id = entry.id, error = %e, "Upstream fetch failed");
                return Retrieval::Empty;
            }
        };

        self.package(key, stream).await
    }

    /// Invalidate the stale entry, resolve exactly once more, and fetch again.
    async fn refetch(&self, key: &ObjectKey, stale: &CacheEntry) -> Option<StreamHandle> {
        self.resolver.invalidate(stale).await;

        let fresh = match self.resolver.resolve(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::info!("Re-resolve produced no entry");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, "Re-resolve failed");
                return None;
            }
        };

        match self.open(&fresh).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(entry_id = fresh.id, error = %e, "Re-fetch failed");
                None
            }
        }
    }

    async fn open(&self, entry: &CacheEntry) -> Result<StreamHandle, UpstreamError> {
        let stream = self.fetcher.open(&entry.location).await?;
        with_metrics(|m| m.stream_opened());
        Ok(stream.on_release(|| with_metrics(|m| m.stream_released())))
    }

    /// Attach filename and caption. Dropping `stream` on the early returns
    /// releases it.
    async fn package(&self, key: &ObjectKey, stream: StreamHandle) -> Retrieval {
        let filename = match self.filenames.filename(key).await {
            Ok(Some(filename)) => filename,
            Ok(None) => {
                tracing::info!("No filename for object");
                return Retrieval::Empty;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Filename lookup failed");
                return Retrieval::Empty;
            }
        };

        let metadata = match self.metadata.metadata(key.object_id).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                tracing::info!("No metadata for object");
                return Retrieval::Empty;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metadata lookup failed");
                return Retrieval::Empty;
            }
        };

        Retrieval::Ready(Download {
            stream,
            filename_ascii: filename.ascii(),
            filename: filename.filename,
            caption: metadata.caption(),
        })
    }
}
