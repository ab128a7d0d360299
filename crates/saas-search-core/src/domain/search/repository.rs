//! Search repository for database operations
//!
//! Handles all database interactions for fuzzy search: executing generated
//! entity queries, the search log, persisted entity definitions and saved
//! searches.

use super::entity::{PopularQuery, Row, SavedSearch, SearchLog};
use super::query::{SqlParam, SqlQuery};
use super::registry::EntityConfig;
use super::repository_trait::SearchRepositoryTrait;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Repository for search database operations
#[derive(Debug, Clone)]
pub struct SearchRepository {
    pool: SqlitePool,
}

impl SearchRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SearchRepositoryTrait for SearchRepository {
    // ========== Entity Queries ==========

    async fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = match param {
                SqlParam::Text(s) => q.bind(s.as_str()),
                SqlParam::Integer(i) => q.bind(*i),
                SqlParam::Real(f) => q.bind(*f),
                SqlParam::Bool(b) => q.bind(*b),
            };
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.iter().map(row_to_json).collect()
    }

    // ========== Search Log ==========

    async fn log_search(&self, log: &SearchLog) -> Result<()> {
        let entity_types = serde_json::to_string(&log.entity_types)?;

        sqlx::query(
            r#"
            INSERT INTO fuzzy_search_logs (
                id, query, entity_types, user_id, tenant_id,
                results_count, execution_time_us, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.query)
        .bind(&entity_types)
        .bind(log.user_id)
        .bind(log.tenant_id)
        .bind(log.results_count as i64)
        .bind(log.execution_time_us)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    async fn search_history(&self, user_id: i64, limit: u32) -> Result<Vec<SearchLog>> {
        let rows: Vec<SearchLogRow> = sqlx::query_as(
            r#"
            SELECT id, query, entity_types, user_id, tenant_id,
                   results_count, execution_time_us, created_at
            FROM fuzzy_search_logs
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_log()).collect()
    }

    async fn popular_queries(&self, limit: u32) -> Result<Vec<PopularQuery>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT LOWER(TRIM(query)) AS q, COUNT(*) AS count
            FROM fuzzy_search_logs
            GROUP BY q
            ORDER BY count DESC, q ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|(query, count)| PopularQuery { query, count })
            .collect())
    }

    // ========== Persisted Entity Definitions ==========

    async fn save_entity_definition(&self, name: &str, config: &EntityConfig) -> Result<()> {
        let config_json = serde_json::to_string(config)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO searchable_entities (
                name, display_name, table_name, config, is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                display_name = excluded.display_name,
                table_name = excluded.table_name,
                config = excluded.config,
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(&config.display_name)
        .bind(&config.table_name)
        .bind(&config_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    async fn load_entity_definitions(&self) -> Result<Vec<(String, EntityConfig)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, config FROM searchable_entities WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter()
            .map(|(name, config)| Ok((name, serde_json::from_str(&config)?)))
            .collect()
    }

    async fn deactivate_entity_definition(&self, name: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE searchable_entities SET is_active = 0, updated_at = ? WHERE name = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_entity_removal(&self, name: &str, config: &EntityConfig) -> Result<()> {
        let config_json = serde_json::to_string(config)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO searchable_entities (
                name, display_name, table_name, config, is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                is_active = 0,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(&config.display_name)
        .bind(&config.table_name)
        .bind(&config_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    async fn removed_entity_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM searchable_entities WHERE is_active = 0 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // ========== Saved Searches ==========

    async fn save_saved_search(&self, search: &SavedSearch) -> Result<()> {
        let entity_types = serde_json::to_string(&search.entity_types)?;
        let filters = serde_json::to_string(&search.filters)?;

        sqlx::query(
            r#"
            INSERT INTO saved_searches (
                id, name, description, query, entity_types, filters,
                user_id, tenant_id, is_public, use_count, last_used_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                query = excluded.query,
                entity_types = excluded.entity_types,
                filters = excluded.filters,
                is_public = excluded.is_public,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(search.id.to_string())
        .bind(&search.name)
        .bind(&search.description)
        .bind(&search.query)
        .bind(&entity_types)
        .bind(&filters)
        .bind(search.user_id)
        .bind(search.tenant_id)
        .bind(search.is_public)
        .bind(search.use_count)
        .bind(search.last_used_at)
        .bind(search.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    async fn get_saved_search(&self, id: Uuid) -> Result<Option<SavedSearch>> {
        let row: Option<SavedSearchRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, query, entity_types, filters,
                   user_id, tenant_id, is_public, use_count, last_used_at,
                   created_at, updated_at
            FROM saved_searches
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(|row| row.into_saved_search()).transpose()
    }

    async fn list_saved_searches(&self, user_id: i64, tenant_id: i64) -> Result<Vec<SavedSearch>> {
        let rows: Vec<SavedSearchRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, query, entity_types, filters,
                   user_id, tenant_id, is_public, use_count, last_used_at,
                   created_at, updated_at
            FROM saved_searches
            WHERE tenant_id = ? AND (user_id = ? OR is_public = 1)
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(|row| row.into_saved_search()).collect()
    }

    async fn touch_saved_search(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE saved_searches SET use_count = use_count + 1, last_used_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    // ========== Health ==========

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;
        Ok(())
    }
}

/// Decode a row into JSON by each value's storage class.
///
/// SQLite is dynamically typed, so the runtime type of the value decides the
/// JSON shape rather than the declared column type. BLOBs become base64.
pub fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(Error::DatabaseError)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(
                    row.try_get_unchecked::<i64, _>(i)
                        .map_err(Error::DatabaseError)?,
                ),
                "REAL" => serde_json::Number::from_f64(
                    row.try_get_unchecked::<f64, _>(i)
                        .map_err(Error::DatabaseError)?,
                )
                .map(Value::Number)
                .unwrap_or(Value::Null),
                "BLOB" => Value::String(
                    BASE64.encode(
                        row.try_get_unchecked::<Vec<u8>, _>(i)
                            .map_err(Error::DatabaseError)?,
                    ),
                ),
                _ => Value::String(
                    row.try_get_unchecked::<String, _>(i)
                        .map_err(Error::DatabaseError)?,
                ),
            }
        };
        map.insert(column.name().to_string(), value);
    }

    Ok(map)
}

fn parse_uuid(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| Error::Other(format!("Invalid {} ID: {}", what, e)))
}

// ========== Database Row Types ==========

#[derive(sqlx::FromRow)]
struct SearchLogRow {
    id: String,
    query: String,
    entity_types: String,
    user_id: Option<i64>,
    tenant_id: Option<i64>,
    results_count: i64,
    execution_time_us: i64,
    created_at: DateTime<Utc>,
}

impl SearchLogRow {
    fn into_log(self) -> Result<SearchLog> {
        Ok(SearchLog {
            id: parse_uuid(&self.id, "search log")?,
            query: self.query,
            entity_types: serde_json::from_str(&self.entity_types)?,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            results_count: self.results_count.max(0) as u32,
            execution_time_us: self.execution_time_us,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SavedSearchRow {
    id: String,
    name: String,
    description: Option<String>,
    query: String,
    entity_types: String,
    filters: String,
    user_id: i64,
    tenant_id: i64,
    is_public: bool,
    use_count: i64,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SavedSearchRow {
    fn into_saved_search(self) -> Result<SavedSearch> {
        let filters: BTreeMap<String, Value> = serde_json::from_str(&self.filters)?;

        Ok(SavedSearch {
            id: parse_uuid(&self.id, "saved search")?,
            name: self.name,
            description: self.description,
            query: self.query,
            entity_types: serde_json::from_str(&self.entity_types)?,
            filters,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            is_public: self.is_public,
            use_count: self.use_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
