//! Stash Core - Entity Types and Collaborator Traits
//!
//! Plain data structures for cached files, the upstream stream handle, and
//! the async traits every collaborator (record store, upstream fetcher,
//! metadata and filename resolvers, populator, catalog, job queue) implements.
//! This crate holds no I/O of its own.

pub mod error;
pub mod stream;
pub mod traits;

pub use error::{ConfigError, QueueError, StashError, StashResult, StorageError, UpstreamError};
pub use stream::{ByteStream, StreamHandle};
pub use traits::{
    CachePopulator, CacheStore, Catalog, FilenameResolver, JobQueue, MetadataResolver,
    UpstreamFetcher,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Surrogate id assigned by the record store.
pub type EntryId = i32;

/// Logical identity of a cached file: external object id plus type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ObjectKey {
    pub object_id: i32,
    pub object_type: String,
}

impl ObjectKey {
    pub fn new(object_id: i32, object_type: impl Into<String>) -> Self {
        Self {
            object_id,
            object_type: object_type.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.object_type)
    }
}

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// Pointer to a file in upstream storage: a container (chat) and an item
/// (message) inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Location {
    pub chat_id: i64,
    pub message_id: i64,
}

impl Location {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self { chat_id, message_id }
    }
}

/// A persisted cache record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheEntry {
    pub id: EntryId,
    pub object_id: i32,
    pub object_type: String,
    #[serde(flatten)]
    pub location: Location,
}

impl CacheEntry {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.object_id, self.object_type.clone())
    }
}

// ============================================================================
// METADATA
// ============================================================================

/// Descriptive metadata used for response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub object_id: i32,
    pub title: String,
    pub authors: Vec<String>,
}

impl ObjectMetadata {
    /// Human caption: the title, then the author line when there is one.
    pub fn caption(&self) -> String {
        let authors: Vec<&str> = self
            .authors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();

        if authors.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\nAuthors: {}", self.title, authors.join(", "))
        }
    }
}

/// Reduce a filename to what fits in a quoted `Content-Disposition`
/// `filename` parameter. Non-ASCII characters, controls, `"` and `\\` are
/// dropped.
pub fn ascii_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect()
}

/// Display filename of an object as reported by the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileName {
    /// UTF-8 name
    pub filename: String,
    /// Transliterated name, when the downloader supplies one
    #[serde(default)]
    pub filename_ascii: Option<String>,
}

impl FileName {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            filename_ascii: None,
        }
    }

    pub fn with_ascii(mut self, filename_ascii: impl Into<String>) -> Self {
        self.filename_ascii = Some(filename_ascii.into());
        self
    }

    /// Header-safe name. Prefers the upstream transliteration and falls back
    /// to stripping `filename`.
    pub fn ascii(&self) -> String {
        self.filename_ascii
            .as_deref()
            .map(ascii_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ascii_filename(&self.filename))
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// One object listed by the catalog together with the types it is offered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i32,
    pub available_types: Vec<String>,
}

/// A page of the catalog. `pages` is the total page count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    pub page: u32,
    pub pages: u32,
}

// ============================================================================
// JOBS
// ============================================================================

/// Background jobs the service can enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Job {
    /// Populate every catalog object/type that has no cache entry yet.
    RefreshAll,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::RefreshAll => "refresh_all",
        }
    }
}

/// Acknowledgement for an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct JobTicket {
    pub job_id: Uuid,
    pub job: Job,
}

impl JobTicket {
    pub fn new(job: Job) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_entry_serializes_flat_location() {
        let entry = CacheEntry {
            id: 1,
            object_id: 42,
            object_type: "fb2".to_string(),
            location: Location::new(-100, 7),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["chat_id"], -100);
        assert_eq!(json["message_id"], 7);
        assert_eq!(json["object_type"], "fb2");

        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_caption_with_and_without_authors() {
        let mut meta = ObjectMetadata {
            object_id: 1,
            title: "War and Peace".to_string(),
            authors: vec!["Leo Tolstoy".to_string(), " ".to_string()],
        };
        assert_eq!(meta.caption(), "War and Peace\n\nAuthors: Leo Tolstoy");

        meta.authors.clear();
        assert_eq!(meta.caption(), "War and Peace");
    }

    #[test]
    fn test_ascii_filename_drops_multibyte() {
        assert_eq!(ascii_filename("Толстой_War.fb2"), "_War.fb2");
        assert_eq!(ascii_filename("plain name.epub"), "plain name.epub");
        assert_eq!(ascii_filename("tab\there\n.txt"), "tabhere.txt");
        assert_eq!(ascii_filename("say \"hi\"\\.fb2"), "say hi.fb2");
    }

    #[test]
    fn test_file_name_prefers_upstream_transliteration() {
        let name = FileName::new("Толстой_Анна_Каренина.fb2").with_ascii("Tolstoy_Anna_Karenina.fb2");
        assert_eq!(name.ascii(), "Tolstoy_Anna_Karenina.fb2");

        let blank = FileName::new("Толстой_War.fb2").with_ascii("");
        assert_eq!(blank.ascii(), "_War.fb2");

        assert_eq!(FileName::new("War.fb2").ascii(), "War.fb2");
    }

    #[test]
    fn test_file_name_without_ascii_field_deserializes() {
        let name: FileName = serde_json::from_value(serde_json::json!({ "filename": "a.fb2" })).unwrap();
        assert_eq!(name, FileName::new("a.fb2"));
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new(5, "epub").to_string(), "5/epub");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Transliterated names are always valid bare header values.
        #[test]
        fn prop_ascii_filename_is_header_safe(name in "\\PC{0,40}") {
            let ascii = ascii_filename(&name);
            prop_assert!(ascii.chars().all(|c| c.is_ascii_graphic() || c == ' '));
            prop_assert!(!ascii.contains('"') && !ascii.contains('\\'));
            prop_assert!(ascii.len() <= name.len());
        }

        /// ASCII-only names pass through unchanged.
        #[test]
        fn prop_ascii_filename_keeps_ascii(name in "[a-zA-Z0-9 ._-]{0,40}") {
            prop_assert_eq!(ascii_filename(&name), name);
        }
    }
}
