//! Constants for the Stash API
//!
//! Default values shared by configuration, upstream clients and jobs.

// ============================================================================
// DATABASE
// ============================================================================

/// Default maximum connection pool size
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Default connection acquisition timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// UPSTREAM SERVICES
// ============================================================================

/// Default timeout for a single upstream request (connect plus headers)
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// Service label used for the files service in errors and metrics
pub const FILES_SERVICE: &str = "files";

/// Service label used for the library service in errors and metrics
pub const LIBRARY_SERVICE: &str = "library";

/// Service label used for the downloader service in errors and metrics
pub const DOWNLOADER_SERVICE: &str = "downloader";

// ============================================================================
// REFRESH JOB
// ============================================================================

/// Default catalog page size when refreshing the whole cache
pub const DEFAULT_REFRESH_PAGE_SIZE: u32 = 50;

/// Default capacity of the background job queue
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 16;

// ============================================================================
// RESPONSE HEADERS
// ============================================================================

/// Base64 (standard alphabet) encoded display filename
pub const HEADER_FILENAME_B64: &str = "x-filename-b64";

/// Base64 (standard alphabet) encoded caption
pub const HEADER_CAPTION_B64: &str = "x-caption-b64";

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8080;
