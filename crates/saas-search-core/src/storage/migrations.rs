//! Database migrations
//!
//! This module manages SQLite schema migrations for saas-search.
//! Migrations are versioned and applied automatically on database connection.
//! Only the search bookkeeping tables live here; the searched business
//! tables belong to the host application.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Search log and persisted entity definitions
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS fuzzy_search_logs (
        id TEXT PRIMARY KEY NOT NULL,
        query TEXT NOT NULL,
        entity_types TEXT NOT NULL DEFAULT '[]', -- JSON array
        user_id INTEGER,
        tenant_id INTEGER,
        results_count INTEGER NOT NULL DEFAULT 0,
        execution_time_us INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_fuzzy_search_logs_user ON fuzzy_search_logs(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_fuzzy_search_logs_tenant ON fuzzy_search_logs(tenant_id);
    CREATE INDEX IF NOT EXISTS idx_fuzzy_search_logs_query ON fuzzy_search_logs(query);

    CREATE TABLE IF NOT EXISTS searchable_entities (
        name TEXT PRIMARY KEY NOT NULL,
        display_name TEXT NOT NULL,
        table_name TEXT NOT NULL,
        config TEXT NOT NULL, -- JSON EntityConfig
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_searchable_entities_active ON searchable_entities(is_active);
"#;

/// Migration 2: Saved searches
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS saved_searches (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        query TEXT NOT NULL,
        entity_types TEXT NOT NULL DEFAULT '[]', -- JSON array
        filters TEXT NOT NULL DEFAULT '{}', -- JSON object
        user_id INTEGER NOT NULL,
        tenant_id INTEGER NOT NULL,
        is_public BOOLEAN NOT NULL DEFAULT 0,
        use_count INTEGER NOT NULL DEFAULT 0,
        last_used_at TIMESTAMP,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_saved_searches_owner ON saved_searches(tenant_id, user_id);
    CREATE INDEX IF NOT EXISTS idx_saved_searches_public ON saved_searches(tenant_id, is_public);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Search log and searchable entities");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Saved searches");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
