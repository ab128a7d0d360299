//! Repository trait for search persistence
//!
//! This module defines the trait for search storage operations.
//! The trait abstracts over different storage backends (SQLite, etc.).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::entity::{PopularQuery, Row, SavedSearch, SearchLog};
use super::query::SqlQuery;
use super::registry::EntityConfig;

/// Repository trait for search persistence
///
/// Provides entity row retrieval, the search log, persisted entity
/// definitions and saved searches.
#[async_trait]
pub trait SearchRepositoryTrait: Send + Sync {
    // ========== Entity Queries ==========

    /// Execute a generated entity query and decode every row
    async fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<Row>>;

    // ========== Search Log ==========

    /// Record an executed search
    async fn log_search(&self, log: &SearchLog) -> Result<()>;

    /// Most recent searches by a user
    async fn search_history(&self, user_id: i64, limit: u32) -> Result<Vec<SearchLog>>;

    /// Most frequent queries across all users
    async fn popular_queries(&self, limit: u32) -> Result<Vec<PopularQuery>>;

    // ========== Persisted Entity Definitions ==========

    /// Insert or replace a stored entity definition
    async fn save_entity_definition(&self, name: &str, config: &EntityConfig) -> Result<()>;

    /// Every active stored entity definition
    async fn load_entity_definitions(&self) -> Result<Vec<(String, EntityConfig)>>;

    /// Mark a stored definition inactive; returns whether one existed
    async fn deactivate_entity_definition(&self, name: &str) -> Result<bool>;

    /// Store an inactive row for a removed entity type, stored before or not
    async fn record_entity_removal(&self, name: &str, config: &EntityConfig) -> Result<()>;

    /// Names of entity types removed with `record_entity_removal`
    async fn removed_entity_names(&self) -> Result<Vec<String>>;

    // ========== Saved Searches ==========

    /// Insert or update a saved search
    async fn save_saved_search(&self, search: &SavedSearch) -> Result<()>;

    /// Get a saved search by id
    async fn get_saved_search(&self, id: Uuid) -> Result<Option<SavedSearch>>;

    /// A user's own saved searches plus the public ones in their tenant
    async fn list_saved_searches(&self, user_id: i64, tenant_id: i64) -> Result<Vec<SavedSearch>>;

    /// Bump the use count and last-used timestamp
    async fn touch_saved_search(&self, id: Uuid) -> Result<()>;

    // ========== Health ==========

    /// Check that the store answers
    async fn health_check(&self) -> Result<()>;
}
