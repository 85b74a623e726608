//! Cache population pipeline.
//!
//! Produces a fresh upstream location for a key: look the book up in the
//! library, download the source file, resolve its display filename, and
//! upload it to the files service with the caption. The downloaded file is
//! held in memory for the upload.

use async_trait::async_trait;
use stash_core::{CachePopulator, FilenameResolver, Location, ObjectKey, StashResult};

use crate::upstream::{DownloaderClient, FilesClient, LibraryClient};

/// `CachePopulator` over the library, downloader, and files services.
#[derive(Debug, Clone)]
pub struct UpstreamPopulator {
    library: LibraryClient,
    downloader: DownloaderClient,
    files: FilesClient,
}

impl UpstreamPopulator {
    pub fn new(library: LibraryClient, downloader: DownloaderClient, files: FilesClient) -> Self {
        Self {
            library,
            downloader,
            files,
        }
    }

    async fn try_populate(&self, key: &ObjectKey) -> StashResult<Option<Location>> {
        let Some(book) = self.library.book(key.object_id).await? else {
            tracing::debug!("Library does not know the object");
            return Ok(None);
        };

        if !book.available_types.is_empty() && !book.available_types.contains(&key.object_type) {
            tracing::debug!(available = ?book.available_types, "Type not offered for object");
            return Ok(None);
        }

        let Some(data) = self
            .downloader
            .download(book.source_id, book.remote_id, &key.object_type)
            .await?
        else {
            tracing::debug!(source_id = book.source_id, "Source has no file");
            return Ok(None);
        };

        let Some(filename) = self.downloader.filename(key).await? else {
            tracing::debug!("No filename for object");
            return Ok(None);
        };

        let caption = book.metadata().caption();
        let location = self.files.upload(&filename.filename, data, &caption).await?;
        Ok(Some(location))
    }
}

#[async_trait]
impl CachePopulator for UpstreamPopulator {
    #[tracing::instrument(skip(self, key), fields(object_id = key.object_id, object_type = %key.object_type))]
    async fn populate(&self, key: &ObjectKey) -> StashResult<Option<Location>> {
        match self.try_populate(key).await {
            Ok(location) => Ok(location),
            Err(e) => {
                tracing::error!(error = %e, "Cache population failed");
                Ok(None)
            }
        }
    }
}
