//! Storage layer - SQLite
//!
//! Provides database management and migrations for saas-search.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning for the search bookkeeping tables
//!
//! # Usage
//!
//! ```ignore
//! use saas_search_core::storage::Database;
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Or open a file
//! let db = Database::open("search.db").await?;
//! ```

pub mod database;
pub mod migrations;

// Re-export commonly used types
pub use database::{Database, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
