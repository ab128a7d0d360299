//! saas-search core library
//!
//! This crate provides the core functionality for saas-search, including:
//! - Entity registry with weighted search fields and per-type formatting
//! - Parameterized per-entity query building
//! - Relevance scoring, highlighting and cross-entity ranking
//! - Storage (SQLite) for the search log, persisted entities and saved searches
//! - File-backed configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;


pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::domain::search::{
        CallerIdentity, EntityConfig, FieldConfig, FuzzySearchConfig, FuzzySearchService,
        SearchOptions, SearchResponse, SearchResult, SearchType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
