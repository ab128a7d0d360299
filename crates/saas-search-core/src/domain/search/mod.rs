//! Multi-entity fuzzy search
//!
//! Searches heterogeneous tables through one engine and returns a single
//! ranked, paginated result list.
//!
//! # Architecture
//!
//! - **Registry**: `EntityRegistry` of `EntityConfig`s (table, weighted search
//!   fields, joins, static filters, permissions) plus per-type formatters
//! - **Query**: `EntityQueryBuilder` turns one config and one request into a
//!   parameterized SQL statement
//! - **Scoring**: `Scorer` ranks rows and highlights matches
//! - **Repository**: `SearchRepository` executes queries and stores the
//!   search log, persisted entities and saved searches
//! - **Service**: `FuzzySearchService` runs entity queries concurrently,
//!   merges and paginates
//!
//! # Example
//!
//! ```ignore
//! use saas_search_core::domain::search::{FuzzySearchService, SearchOptions, CallerIdentity};
//!
//! let service = FuzzySearchService::new(pool, Default::default(), Default::default()).await;
//! let response = service
//!     .search(SearchOptions::new("acme").with_identity(CallerIdentity::user(1, 42)))
//!     .await?;
//! for result in response.results {
//!     println!("{} {} ({:.2})", result.entity_type, result.title, result.score);
//! }
//! ```

pub mod config;
pub mod entity;
pub mod formatter;
pub mod query;
pub mod registry;
pub mod repository;
pub mod repository_trait;
pub mod scoring;
pub mod service;
pub mod specification;

// Re-export main types
pub use config::{EngineSettings, FuzzySearchConfig};
pub use entity::{
    CallerIdentity, EntityTypeInfo, HealthReport, PopularQuery, Row, SavedSearch, SearchLog,
    SearchOptions, SearchResponse, SearchResult, SearchStats, SortOrder, TypeAggregation,
};
pub use formatter::{GenericFormatter, ResultFormatter};
pub use query::{EntityQueryBuilder, SqlParam, SqlQuery};
pub use registry::{
    EntityConfig, EntityDefinition, EntityRegistry, FieldConfig, JoinConfig, JoinKind,
    PermissionConfig, SearchType,
};
pub use repository::SearchRepository;
pub use repository_trait::SearchRepositoryTrait;
pub use scoring::Scorer;
pub use service::FuzzySearchService;
