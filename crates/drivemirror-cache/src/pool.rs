//! Snapshot database handle
//!
//! The daemon is the only writer and touches the database twice per usage
//! scan at most, so one connection with SQLite's default rollback journal is
//! enough. The schema version lives in `PRAGMA user_version`; a database
//! written by a newer schema is refused rather than silently reinterpreted.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Schema version this build writes
pub const SCHEMA_VERSION: i64 = 1;

/// Single-connection SQLite pool holding the namespace snapshots
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to [`SCHEMA_VERSION`]
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` if the file cannot be opened,
    /// `CacheError::MigrationFailed` if the schema cannot be applied or is
    /// newer than this build.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = Self::connect(options, &db_path.display().to_string()).await?;
        tracing::info!(path = %db_path.display(), "Snapshot database ready");
        Ok(pool)
    }

    /// In-memory database for tests
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse().map_err(|e| {
            CacheError::ConnectionFailed(format!("Failed to open database memory: {e}"))
        })?;
        Self::connect(options, "memory").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, CacheError> {
        // An in-memory database lives exactly as long as its one connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to open database {label}: {e}"))
            })?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to read schema version: {e}")))?;

        if version > SCHEMA_VERSION {
            return Err(CacheError::MigrationFailed(format!(
                "Database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        if version == SCHEMA_VERSION {
            tracing::debug!(version, "Snapshot schema up to date");
            return Ok(());
        }

        sqlx::raw_sql(include_str!("migrations/20261019_initial.sql"))
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to apply schema: {e}")))?;
        sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to record schema version: {e}")))?;

        tracing::debug!(from = version, to = SCHEMA_VERSION, "Snapshot schema migrated");
        Ok(())
    }
}
