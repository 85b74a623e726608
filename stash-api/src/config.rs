//! Service Configuration Module
//!
//! Everything the server needs besides the database: its own API key, the
//! three upstream services, timeouts, and job settings. Loaded from
//! environment variables with development defaults; `validate_for_production`
//! refuses to start a production deployment with missing credentials.

use secrecy::{ExposeSecret, SecretString};
use stash_core::ConfigError;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_JOB_QUEUE_CAPACITY, DEFAULT_PORT, DEFAULT_REFRESH_PAGE_SIZE,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

// ============================================================================
// SECRET KEYS
// ============================================================================

/// A shared-secret API key. Never printed.
#[derive(Clone)]
pub struct ServiceKey(SecretString);

impl ServiceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::new(key.into().into()))
    }

    /// Expose the key value (only for header construction and comparison).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceKey([REDACTED])")
    }
}

// ============================================================================
// UPSTREAM ENDPOINTS
// ============================================================================

/// Base URL and key of one upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    /// Base URL without a trailing slash
    pub url: String,
    /// Sent verbatim in the `Authorization` header
    pub api_key: ServiceKey,
}

impl UpstreamEndpoint {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: ServiceKey::new(api_key),
        }
    }

    /// Join a path onto the base URL.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Runtime configuration for the cached-file service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Key clients must present in the `Authorization` header
    pub api_key: ServiceKey,

    /// Book metadata and catalog service
    pub library: UpstreamEndpoint,

    /// Produces file bytes and display filenames
    pub downloader: UpstreamEndpoint,

    /// Stores uploaded files and streams them back
    pub files: UpstreamEndpoint,

    /// Per-request timeout for upstream calls
    pub upstream_timeout: Duration,

    /// Bounded capacity of the background job queue
    pub job_queue_capacity: usize,

    /// Catalog page size used by the refresh job
    pub refresh_page_size: u32,

    /// Deployment environment (production, staging, development)
    pub environment: String,

    /// Host the HTTP server binds to
    pub bind_host: String,

    /// Port the HTTP server binds to
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: ServiceKey::new(""),
            library: UpstreamEndpoint::new("http://localhost:8082", ""),
            downloader: UpstreamEndpoint::new("http://localhost:8083", ""),
            files: UpstreamEndpoint::new("http://localhost:8084", ""),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            job_queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
            refresh_page_size: DEFAULT_REFRESH_PAGE_SIZE,
            environment: "development".to_string(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STASH_API_KEY`: Key expected from clients
    /// - `STASH_LIBRARY_URL` / `STASH_LIBRARY_API_KEY`
    /// - `STASH_DOWNLOADER_URL` / `STASH_DOWNLOADER_API_KEY`
    /// - `STASH_FILES_URL` / `STASH_FILES_API_KEY`
    /// - `STASH_UPSTREAM_TIMEOUT_SECS`: Upstream request timeout (default: 60)
    /// - `STASH_JOB_QUEUE_CAPACITY`: Job queue capacity (default: 16)
    /// - `STASH_REFRESH_PAGE_SIZE`: Catalog page size for refresh (default: 50)
    /// - `STASH_ENVIRONMENT`: Deployment environment (default: development)
    /// - `STASH_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `STASH_API_PORT`: Bind port (default: 8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = |url_var: &str, key_var: &str, fallback: &UpstreamEndpoint| {
            let url = lookup(url_var).unwrap_or_else(|| fallback.url.clone());
            let key = lookup(key_var).unwrap_or_default();
            UpstreamEndpoint::new(url, key)
        };

        let port = match lookup("PORT").or_else(|| lookup("STASH_API_PORT")) {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                value: value.clone(),
                reason: "must be a port number".to_string(),
            })?,
            None => defaults.port,
        };

        let refresh_page_size = lookup("STASH_REFRESH_PAGE_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.refresh_page_size);
        if refresh_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "STASH_REFRESH_PAGE_SIZE".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            api_key: ServiceKey::new(lookup("STASH_API_KEY").unwrap_or_default()),
            library: endpoint("STASH_LIBRARY_URL", "STASH_LIBRARY_API_KEY", &defaults.library),
            downloader: endpoint(
                "STASH_DOWNLOADER_URL",
                "STASH_DOWNLOADER_API_KEY",
                &defaults.downloader,
            ),
            files: endpoint("STASH_FILES_URL", "STASH_FILES_API_KEY", &defaults.files),
            upstream_timeout: Duration::from_secs(
                lookup("STASH_UPSTREAM_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            job_queue_capacity: lookup("STASH_JOB_QUEUE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.job_queue_capacity),
            refresh_page_size,
            environment: lookup("STASH_ENVIRONMENT")
                .unwrap_or(defaults.environment)
                .to_lowercase(),
            bind_host: lookup("STASH_API_BIND").unwrap_or(defaults.bind_host),
            port,
        })
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment == "production" || self.environment == "prod"
    }

    /// Refuse production deployments with missing keys.
    ///
    /// In development an empty client key disables authentication; this is
    /// logged loudly instead of rejected.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        let required = [
            ("STASH_API_KEY", &self.api_key),
            ("STASH_LIBRARY_API_KEY", &self.library.api_key),
            ("STASH_DOWNLOADER_API_KEY", &self.downloader.api_key),
            ("STASH_FILES_API_KEY", &self.files.api_key),
        ];

        for (field, key) in required {
            if key.is_empty() {
                if self.is_production() {
                    return Err(ConfigError::MissingRequired {
                        field: field.to_string(),
                    });
                }
                tracing::warn!(field, "Key is empty, acceptable only outside production");
            }
        }

        Ok(())
    }
}
