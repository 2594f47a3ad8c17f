//! # SQLite persistence
//!
//! Pool construction for the indexed backend. The schema in `migrations/`
//! is embedded at compile time and applied every time a pool is opened.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("tracker.db")).await?;
//! ```

use crate::{LibraryError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where and how the tracker database is opened.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// In-memory database.
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            None => SqliteConnectOptions::new().in_memory(true),
        };

        options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the pool, apply pending migrations and check the connection.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        path = ?config.path,
        max_connections = config.max_connections,
        "Opening tracker database"
    );

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if config.path.is_none() {
        pool_options = pool_options.max_lifetime(None).idle_timeout(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open tracker database");
            LibraryError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Timestamps are stored as integer nanoseconds since the epoch so a reload
/// compares equal to what was written.
pub fn encode_timestamp(at: DateTime<Utc>) -> Result<i64> {
    at.timestamp_nanos_opt().ok_or_else(|| LibraryError::InvalidInput {
        field: "timestamp".to_string(),
        message: format!("{} is outside the storable range", at),
    })
}

pub fn decode_timestamp(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    debug!("Tracker schema up to date");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(LibraryError::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.unwrap();
        assert!(health_check(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("/tmp/tracker.db")
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(60))
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.path, Some(PathBuf::from("/tmp/tracker.db")));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(DatabaseConfig::default().path, None);
    }

    #[test]
    fn test_timestamp_encoding_keeps_sub_millisecond_precision() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let encoded = encode_timestamp(at).unwrap();

        assert_eq!(encoded, 1_700_000_000_123_456_789);
        assert_eq!(decode_timestamp(encoded), at);

        let far_future = DateTime::from_timestamp(i64::MAX / 1_000, 0).unwrap();
        assert!(matches!(
            encode_timestamp(far_future),
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        let pool = create_test_pool().await.unwrap();

        sqlx::query("INSERT INTO categories (id, name, sort_order, created_at) VALUES ('c', 'Reading', 0, 0)")
            .execute(&pool)
            .await
            .unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                core_async::task::spawn(async move {
                    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
                        .fetch_one(&pool)
                        .await
                        .unwrap();
                    row.0
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in ["progress_entries", "categories", "mutation_queue"] {
            let result: (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(result.0, 1, "{} table should exist", table);
        }
    }

    #[tokio::test]
    async fn test_file_database_persists_between_pools() {
        let path = std::env::temp_dir().join(format!("tracker-db-{}.db", uuid::Uuid::new_v4()));

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        sqlx::query("INSERT INTO categories (id, name, sort_order, created_at) VALUES ('c', 'Weekly', 0, 0)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let reopened = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let row: (String,) = sqlx::query_as("SELECT name FROM categories WHERE id = 'c'")
            .fetch_one(&reopened)
            .await
            .unwrap();
        assert_eq!(row.0, "Weekly");

        reopened.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
