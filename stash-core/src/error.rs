//! Error types for Stash operations

use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache entry already exists for object {object_id}/{object_type}")]
    Conflict { object_id: i32, object_type: String },

    #[error("Cache entry {id} not found")]
    NotFound { id: i32 },

    #[error("Store connection unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store query failed: {reason}")]
    QueryFailed { reason: String },
}

/// Errors raised by upstream collaborators (files, library, downloader).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The stored location no longer resolves upstream.
    #[error("Upstream location is gone: {reason}")]
    Gone { reason: String },

    /// The upstream could not be reached or timed out.
    #[error("Upstream {service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("Upstream {service} returned status {status}")]
    BadStatus { service: String, status: u16 },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl UpstreamError {
    /// Whether this failure means the pointer itself is stale.
    pub fn is_gone(&self) -> bool {
        matches!(self, UpstreamError::Gone { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Job queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

/// Master error type for all Stash errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StashError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result type alias for Stash operations.
pub type StashResult<T> = Result<T, StashError>;
