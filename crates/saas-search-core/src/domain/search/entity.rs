//! Search entity and related types
//!
//! Request, result and bookkeeping types for multi-entity search.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

/// A database row decoded into column name → JSON value
pub type Row = serde_json::Map<String, Value>;

/// Render a row column as display text; missing and null columns are empty
pub fn field_text(row: &Row, name: &str) -> String {
    match row.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parse a timestamp column stored as RFC 3339 or SQLite `CURRENT_TIMESTAMP` text
pub fn field_timestamp(row: &Row, name: &str) -> Option<DateTime<Utc>> {
    let text = row.get(name)?.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc`, anything else is descending
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// Who is searching
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
    pub role: Option<String>,
}

impl CallerIdentity {
    /// An anonymous caller
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A user within a tenant
    pub fn user(user_id: i64, tenant_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            tenant_id: Some(tenant_id),
            role: None,
        }
    }

    /// Set the role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Whether any identity was supplied
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() || self.tenant_id.is_some()
    }
}

/// Per-request search parameters.
///
/// `total` is always computed, so a client's `include_count` flag is
/// accepted and ignored like any other unknown key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// The free-text query
    pub query: String,
    /// Entity types to search (empty = all registered)
    pub entity_types: Vec<String>,
    /// Equality filters applied to every searched entity
    pub filters: BTreeMap<String, Value>,
    /// `score` (default), `title`, `type`, `created_at` or any row column
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub offset: i64,
    /// Page size; zero or above `max_results` means `max_results`
    pub limit: i64,
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
    pub role: Option<String>,
    pub include_aggregations: bool,
    /// Restrict highlighting to these fields (empty = all search fields)
    pub highlight_fields: Vec<String>,
    /// Request deadline
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl SearchOptions {
    /// Create options for a query with default settings
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the entity types to search
    pub fn with_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Add an equality filter
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Set pagination
    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Set the caller identity
    pub fn with_identity(mut self, identity: CallerIdentity) -> Self {
        self.user_id = identity.user_id;
        self.tenant_id = identity.tenant_id;
        self.role = identity.role;
        self
    }

    /// Set sorting
    pub fn with_sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(order);
        self
    }

    /// Set the request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The caller identity carried by these options
    pub fn identity(&self) -> CallerIdentity {
        CallerIdentity {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            role: self.role.clone(),
        }
    }
}

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Value,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub title: String,
    pub description: String,
    pub url: String,
    /// Relevance score (higher is better, never negative)
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    /// The full underlying row
    pub data: Row,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SearchResult {
    /// Create a result for a row; title and score are filled in by the scorer
    pub fn new(entity_type: impl Into<String>, data: Row) -> Self {
        Self {
            id: data.get("id").cloned().unwrap_or(Value::Null),
            entity_type: entity_type.into(),
            title: String::new(),
            description: String::new(),
            url: String::new(),
            score: 0.0,
            highlights: Vec::new(),
            data,
            metadata: serde_json::Map::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the relevance score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }
}

/// Per-entity aggregation over the candidate results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAggregation {
    pub count: usize,
    pub max_score: f64,
    pub avg_score: f64,
}

/// The complete search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    /// Full candidate count, independent of pagination
    pub total: usize,
    pub results: Vec<SearchResult>,
    /// Candidate count per entity type
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub categories: HashMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<BTreeMap<String, TypeAggregation>>,
    pub execution_time_ms: u64,
}

impl SearchResponse {
    /// An empty response for a query that matched nothing or was skipped
    pub fn empty(query: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            query: query.into(),
            total: 0,
            results: Vec::new(),
            categories: HashMap::new(),
            suggestions: Vec::new(),
            aggregations: None,
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Listing view of a registered entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeInfo {
    pub name: String,
    pub display_name: String,
    pub search_fields: Vec<String>,
    pub description: String,
    pub require_auth: bool,
}

/// Service statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    pub total_entity_types: usize,
    pub entity_types: Vec<String>,
    pub config: super::config::FuzzySearchConfig,
    pub status: String,
}

/// Service health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub entity_types: usize,
    pub database: bool,
    pub last_check: DateTime<Utc>,
}

/// Log entry for an executed search (analytics trail)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLog {
    pub id: Uuid,
    pub query: String,
    pub entity_types: Vec<String>,
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
    pub results_count: u32,
    /// Execution time in microseconds
    pub execution_time_us: i64,
    pub created_at: DateTime<Utc>,
}

impl SearchLog {
    /// Create a new search log entry
    pub fn new(
        query: impl Into<String>,
        entity_types: Vec<String>,
        identity: &CallerIdentity,
        results_count: u32,
        execution_time: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            entity_types,
            user_id: identity.user_id,
            tenant_id: identity.tenant_id,
            results_count,
            execution_time_us: execution_time.as_micros() as i64,
            created_at: Utc::now(),
        }
    }
}

/// A frequently searched query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularQuery {
    pub query: String,
    pub count: i64,
}

/// A stored search that can be re-run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub query: String,
    pub entity_types: Vec<String>,
    pub filters: BTreeMap<String, Value>,
    pub user_id: i64,
    pub tenant_id: i64,
    /// Visible to everyone in the tenant
    pub is_public: bool,
    pub use_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedSearch {
    /// Create a private saved search owned by a user
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        user_id: i64,
        tenant_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            query: query.into(),
            entity_types: Vec::new(),
            filters: BTreeMap::new(),
            user_id,
            tenant_id,
            is_public: false,
            use_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Restrict to entity types
    pub fn with_entity_types(mut self, types: Vec<String>) -> Self {
        self.entity_types = types;
        self
    }

    /// Make visible to the whole tenant
    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    /// Build the options this saved search runs with
    pub fn to_options(&self, identity: CallerIdentity) -> SearchOptions {
        SearchOptions {
            query: self.query.clone(),
            entity_types: self.entity_types.clone(),
            filters: self.filters.clone(),
            ..Default::default()
        }
        .with_identity(identity)
    }
}
