//! SQLite pool for the search bookkeeping tables
//!
//! A file store runs in WAL mode with a small pool. An in-memory store keeps a
//! single connection, since each SQLite `:memory:` connection is its own
//! database. Both enforce foreign keys and are migrated on open.

use crate::storage::migrations::{self, MigrationStatus};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};

/// Pool size for file-backed stores
const FILE_POOL_SIZE: u32 = 5;

/// Where the CLI keeps its store unless told otherwise
pub fn default_database_path() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("saas-search").join("saas-search.db"),
        None => PathBuf::from("saas-search.db"),
    }
}

/// A migrated connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    /// `None` for in-memory stores
    path: Option<PathBuf>,
}

impl Database {
    /// Open the store at `path`, creating the file and its directory if needed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        Self::migrated(pool, Some(path)).await
    }

    /// A private in-memory store, used by tests and throwaway sessions
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Self::migrated(pool, None).await
    }

    async fn migrated(pool: SqlitePool, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The backing file, or `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool)
            .await
            .context("Failed to check migration status")
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Close every pooled connection; a WAL store checkpoints on the last one
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
