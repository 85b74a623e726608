//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the
//! `CacheStore` implementation over the `cached_files` table. The unique
//! constraint on (object_id, object_type) is what guarantees at most one
//! record per key; concurrent inserts surface as `StorageError::Conflict`.

use crate::constants::{DEFAULT_DB_POOL_SIZE, DEFAULT_DB_TIMEOUT_SECS};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use stash_core::{
    CacheEntry, CacheStore, EntryId, Location, ObjectKey, StashError, StashResult, StorageError,
};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "stash".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("STASH_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("STASH_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("STASH_DB_NAME").unwrap_or_else(|_| "stash".to_string()),
            user: std::env::var("STASH_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("STASH_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("STASH_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("STASH_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StashResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Unavailable {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const CREATE_CACHED_FILES: &str = "
    CREATE TABLE IF NOT EXISTS cached_files (
        id SERIAL PRIMARY KEY,
        object_id INTEGER NOT NULL,
        object_type VARCHAR(8) NOT NULL,
        message_id BIGINT NOT NULL,
        chat_id BIGINT NOT NULL,
        CONSTRAINT uc_cached_files_object_id_object_type UNIQUE (object_id, object_type)
    )";

const CREATE_OBJECT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS ix_cached_files_object_id ON cached_files (object_id)";

const COLUMNS: &str = "id, object_id, object_type, message_id, chat_id";

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> StashResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Close the pool. Waiting and future checkouts fail with `PoolError::Closed`.
    pub fn close(&self) {
        self.pool.close();
        tracing::info!("Database pool closed");
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> StashResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the `cached_files` table and its index if missing.
    pub async fn ensure_schema(&self) -> StashResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(CREATE_CACHED_FILES)
            .await
            .map_err(query_error)?;
        conn.batch_execute(CREATE_OBJECT_INDEX)
            .await
            .map_err(query_error)?;
        tracing::debug!("cached_files schema ensured");
        Ok(())
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> StashError {
    tracing::error!("Connection pool error: {:?}", err);
    StorageError::Unavailable {
        reason: err.to_string(),
    }
    .into()
}

fn query_error(err: tokio_postgres::Error) -> StashError {
    tracing::error!("Database error: {:?}", err);
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

fn parse_entry(row: &Row) -> StashResult<CacheEntry> {
    let read = |e: tokio_postgres::Error| StashError::from(StorageError::QueryFailed {
        reason: format!("Malformed cached_files row: {}", e),
    });

    Ok(CacheEntry {
        id: row.try_get("id").map_err(read)?,
        object_id: row.try_get("object_id").map_err(read)?,
        object_type: row.try_get("object_type").map_err(read)?,
        location: Location {
            chat_id: row.try_get("chat_id").map_err(read)?,
            message_id: row.try_get("message_id").map_err(read)?,
        },
    })
}

// ============================================================================
// CACHE STORE
// ============================================================================

#[async_trait]
impl CacheStore for DbClient {
    async fn get(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM cached_files WHERE object_id = $1 AND object_type = $2",
            COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&key.object_id, &key.object_type])
            .await
            .map_err(query_error)?;

        row.as_ref().map(parse_entry).transpose()
    }

    async fn insert(&self, key: &ObjectKey, location: &Location) -> StashResult<CacheEntry> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO cached_files (object_id, object_type, message_id, chat_id) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            COLUMNS
        );
        let result = conn
            .query_one(
                sql.as_str(),
                &[
                    &key.object_id,
                    &key.object_type,
                    &location.message_id,
                    &location.chat_id,
                ],
            )
            .await;

        match result {
            Ok(row) => parse_entry(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                tracing::debug!(key = %key, "Insert lost race on unique key");
                Err(StorageError::Conflict {
                    object_id: key.object_id,
                    object_type: key.object_type.clone(),
                }
                .into())
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn update_location(&self, id: EntryId, location: &Location) -> StashResult<CacheEntry> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE cached_files SET message_id = $2, chat_id = $3 WHERE id = $1 RETURNING {}",
            COLUMNS
        );
        let row = conn
            .query_opt(
                sql.as_str(),
                &[&id, &location.message_id, &location.chat_id],
            )
            .await
            .map_err(query_error)?
            .ok_or(StorageError::NotFound { id })?;

        parse_entry(&row)
    }

    async fn delete(&self, id: EntryId) -> StashResult<Option<CacheEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!("DELETE FROM cached_files WHERE id = $1 RETURNING {}", COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(query_error)?;

        row.as_ref().map(parse_entry).transpose()
    }

    async fn delete_by_key(&self, key: &ObjectKey) -> StashResult<Option<CacheEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "DELETE FROM cached_files WHERE object_id = $1 AND object_type = $2 RETURNING {}",
            COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&key.object_id, &key.object_type])
            .await
            .map_err(query_error)?;

        row.as_ref().map(parse_entry).transpose()
    }

    async fn health_check(&self) -> StashResult<()> {
        let conn = self.get_conn().await?;

        // Simple query to verify connectivity
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "stash");
        assert_eq!(config.max_size, DEFAULT_DB_POOL_SIZE);
    }

    #[test]
    fn test_schema_enforces_one_record_per_key() {
        assert!(CREATE_CACHED_FILES.contains("UNIQUE (object_id, object_type)"));
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        // No server is contacted until the first checkout.
        let client = DbClient::from_config(&DbConfig::default());
        assert!(client.is_ok());
    }
}
