//! Error types for saas-search

use thiserror::Error;

/// Result type alias using saas-search's Error
pub type Result<T> = std::result::Result<T, Error>;

/// saas-search error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E001-E099)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Registry errors (E100-E199)
    #[error("Invalid entity configuration for '{name}': {reason}")]
    InvalidEntityConfig { name: String, reason: String },

    #[error("Entity type '{name}' is not registered. Valid types: {}", valid_types.join(", "))]
    UnknownEntityType {
        name: String,
        valid_types: Vec<String>,
    },

    // Search errors (E200-E299)
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Saved search '{0}' not found.")]
    SavedSearchNotFound(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E001",
            Self::InvalidEntityConfig { .. } => "E100",
            Self::UnknownEntityType { .. } => "E101",
            Self::SearchFailed(_) => "E200",
            Self::SavedSearchNotFound(_) => "E201",
            Self::DatabaseError(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownEntityType { .. } => Some("saas-search entities list".to_string()),
            Self::InvalidEntityConfig { .. } => {
                Some("Provide a table_name and at least one search field".to_string())
            }
            Self::SavedSearchNotFound(_) => {
                Some("saas-search saved list --user-id <id> --tenant-id <id>".to_string())
            }
            Self::ConfigError(_) => Some("saas-search config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error was caused by the caller rather than the engine or store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::InvalidEntityConfig { .. }
                | Self::UnknownEntityType { .. }
                | Self::SavedSearchNotFound(_)
        )
    }
}
