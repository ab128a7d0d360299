//! Entity registry
//!
//! Maps entity-type names to the configuration describing how that entity's
//! backing table is queried and scored. Registration is rare and lookups are
//! frequent, so the map sits behind a reader/writer lock and searches work on
//! cheap `Arc` snapshots.

use super::formatter::{
    ContactFormatter, CustomerFormatter, EmailFormatter, PlanFormatter, ResultFormatter,
    UserFormatter,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How a search field is matched against query terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Field equals the term
    Exact,
    /// Field starts with the term
    Prefix,
    /// Field contains the term
    #[default]
    Contains,
    /// Word-level match, best effort on stores without native full-text search
    Fulltext,
    /// Approximate subsequence match
    Fuzzy,
}

impl SearchType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Contains => "contains",
            Self::Fulltext => "fulltext",
            Self::Fuzzy => "fuzzy",
        }
    }

    /// Parse a search type, falling back to `Contains` for unknown names
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "exact" => Self::Exact,
            "prefix" => Self::Prefix,
            "fulltext" => Self::Fulltext,
            "fuzzy" => Self::Fuzzy,
            _ => Self::Contains,
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A searchable column within an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Column identifier
    pub name: String,
    /// Linear multiplier applied to this field's match score
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Predicate shape and scoring heuristic
    #[serde(default)]
    pub search_type: SearchType,
    /// Extra multiplicative factor, `score *= 1 + boost`
    #[serde(default)]
    pub boost: f64,
    /// Terms shorter than this skip the field
    #[serde(default)]
    pub min_length: usize,
}

fn default_weight() -> f64 {
    1.0
}

impl FieldConfig {
    /// Create a field with weight and search type, no boost
    pub fn new(name: impl Into<String>, weight: f64, search_type: SearchType) -> Self {
        Self {
            name: name.into(),
            weight,
            search_type,
            boost: 0.0,
            min_length: 0,
        }
    }

    /// Set the boost
    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }

    /// Set the minimum term length
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }
}

/// Kind of SQL join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    #[serde(alias = "INNER")]
    Inner,
    #[serde(alias = "LEFT")]
    Left,
    #[serde(alias = "RIGHT")]
    Right,
}

impl JoinKind {
    /// SQL keyword for this join
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

/// A table joined into an entity's search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
    pub table: String,
    pub condition: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: JoinKind,
}

/// Access rules for an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Never query this entity without a caller identity
    pub require_auth: bool,
    /// Roles allowed to search this entity (empty = any)
    pub allowed_roles: Vec<String>,
    /// Column holding the owning user id
    pub ownership_field: Option<String>,
    /// Column holding the tenant id
    #[serde(alias = "organization_field")]
    pub tenant_field: Option<String>,
}

/// How one entity type is searched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub table_name: String,
    pub display_name: String,
    pub search_fields: Vec<FieldConfig>,
    /// Explicit projection; empty selects every column
    pub select_fields: Vec<String>,
    pub join_tables: Vec<JoinConfig>,
    /// Static filter always applied
    pub where_clause: Option<String>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub permissions: PermissionConfig,
    /// Copied onto every result of this entity
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EntityConfig {
    /// Create a config for a table with a display name
    pub fn new(table_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Add a search field
    pub fn with_field(mut self, field: FieldConfig) -> Self {
        self.search_fields.push(field);
        self
    }

    /// Set the projection
    pub fn with_select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Add a join
    pub fn with_join(
        mut self,
        table: impl Into<String>,
        condition: impl Into<String>,
        kind: JoinKind,
    ) -> Self {
        self.join_tables.push(JoinConfig {
            table: table.into(),
            condition: condition.into(),
            kind,
        });
        self
    }

    /// Set the static where clause
    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// Set the static ordering
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Set the permissions
    pub fn with_permissions(mut self, permissions: PermissionConfig) -> Self {
        self.permissions = permissions;
        self
    }

    /// Require a caller identity and scope rows by tenant column
    pub fn tenant_scoped(mut self, tenant_field: impl Into<String>) -> Self {
        self.permissions.require_auth = true;
        self.permissions.tenant_field = Some(tenant_field.into());
        self
    }

    /// Validate the config before it enters the registry
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidEntityConfig {
            name: name.to_string(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("entity type name is required".to_string()));
        }
        if self.table_name.trim().is_empty() {
            return Err(invalid("table name is required".to_string()));
        }
        if !is_valid_identifier(&self.table_name) {
            return Err(invalid(format!("invalid table name '{}'", self.table_name)));
        }
        if self.search_fields.is_empty() {
            return Err(invalid("at least one search field is required".to_string()));
        }
        for field in &self.search_fields {
            if !is_valid_identifier(&field.name) {
                return Err(invalid(format!("invalid search field '{}'", field.name)));
            }
            if !field.weight.is_finite() || field.weight < 0.0 {
                return Err(invalid(format!(
                    "weight of field '{}' must be a non-negative number",
                    field.name
                )));
            }
        }
        for column in [
            &self.permissions.tenant_field,
            &self.permissions.ownership_field,
        ]
        .into_iter()
        .flatten()
        {
            if !is_valid_identifier(column) {
                return Err(invalid(format!("invalid permission column '{}'", column)));
            }
        }
        for join in &self.join_tables {
            if !is_valid_identifier(&join.table) && !is_aliased_table(&join.table) {
                return Err(invalid(format!("invalid join table '{}'", join.table)));
            }
            if join.condition.trim().is_empty() {
                return Err(invalid(format!("join on '{}' needs a condition", join.table)));
            }
        }
        Ok(())
    }

    /// Names of the search fields in declaration order
    pub fn search_field_names(&self) -> Vec<String> {
        self.search_fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Check that a name is a plain (optionally dotted) SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn is_aliased_table(table: &str) -> bool {
    let parts: Vec<&str> = table.split_whitespace().collect();
    match parts.as_slice() {
        [table, alias] => is_valid_identifier(table) && is_valid_identifier(alias),
        [table, kw, alias] if kw.eq_ignore_ascii_case("as") => {
            is_valid_identifier(table) && is_valid_identifier(alias)
        }
        _ => false,
    }
}

/// A registered entity: its config plus an optional result formatter
#[derive(Clone)]
pub struct EntityDefinition {
    pub name: String,
    pub config: EntityConfig,
    pub formatter: Option<Arc<dyn ResultFormatter>>,
}

impl fmt::Debug for EntityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDefinition")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Thread-safe registry of searchable entity types
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Arc<RwLock<HashMap<String, Arc<EntityDefinition>>>>,
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the default SaaS entities
    pub async fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_defaults().await;
        registry
    }

    /// Insert or overwrite an entity type after validating its config
    pub async fn register(
        &self,
        name: &str,
        config: EntityConfig,
        formatter: Option<Arc<dyn ResultFormatter>>,
    ) -> Result<()> {
        config.validate(name)?;
        let definition = Arc::new(EntityDefinition {
            name: name.to_string(),
            config,
            formatter,
        });
        let replaced = self
            .entities
            .write()
            .await
            .insert(name.to_string(), definition)
            .is_some();
        tracing::info!(entity_type = name, replaced, "Registered search entity");
        Ok(())
    }

    /// Remove an entity type, returning whether it existed
    pub async fn unregister(&self, name: &str) -> Option<Arc<EntityDefinition>> {
        self.entities.write().await.remove(name)
    }

    /// Look up one entity type
    pub async fn get(&self, name: &str) -> Option<Arc<EntityDefinition>> {
        self.entities.read().await.get(name).cloned()
    }

    /// Snapshot of every registered definition, sorted by name
    pub async fn definitions(&self) -> Vec<Arc<EntityDefinition>> {
        let mut definitions: Vec<_> = self.entities.read().await.values().cloned().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Resolve requested names to definitions; unknown names are skipped.
    ///
    /// An empty request resolves to every registered type. Duplicates in the
    /// request resolve once.
    pub async fn resolve(&self, requested: &[String]) -> Vec<Arc<EntityDefinition>> {
        if requested.is_empty() {
            return self.definitions().await;
        }
        let entities = self.entities.read().await;
        let mut resolved: Vec<Arc<EntityDefinition>> = Vec::with_capacity(requested.len());
        for name in requested {
            match entities.get(name.trim()) {
                Some(def) if !resolved.iter().any(|d| d.name == def.name) => {
                    resolved.push(def.clone())
                }
                Some(_) => {}
                None => tracing::debug!(entity_type = %name, "Ignoring unknown entity type"),
            }
        }
        resolved
    }

    /// Map of every registered name to its config
    pub async fn configs(&self) -> HashMap<String, EntityConfig> {
        self.entities
            .read()
            .await
            .iter()
            .map(|(name, def)| (name.clone(), def.config.clone()))
            .collect()
    }

    /// Sorted entity type names
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered entity types
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Register users, customers, contacts, plans and emails
    pub async fn register_defaults(&self) {
        for (name, config, formatter) in default_entities() {
            if let Err(e) = self.register(name, config, Some(formatter)).await {
                tracing::warn!(entity_type = name, error = %e, "Default entity rejected");
            }
        }
    }
}

/// The stock SaaS entities with hand-tuned weights
pub fn default_entities() -> Vec<(&'static str, EntityConfig, Arc<dyn ResultFormatter>)> {
    use SearchType::{Contains, Fulltext, Prefix};

    vec![
        (
            "users",
            EntityConfig::new("users", "Users")
                .with_field(FieldConfig::new("first_name", 1.0, Contains))
                .with_field(FieldConfig::new("last_name", 1.0, Contains))
                .with_field(FieldConfig::new("email", 0.8, Contains))
                .with_field(FieldConfig::new("username", 0.9, Prefix))
                .with_select(&["id", "first_name", "last_name", "email", "username", "created_at"])
                .with_where("active = 1")
                .with_order_by("first_name, last_name")
                .tenant_scoped("organization_id"),
            Arc::new(UserFormatter),
        ),
        (
            "customers",
            EntityConfig::new("customers", "Customers")
                .with_field(FieldConfig::new("name", 1.0, Contains))
                .with_field(FieldConfig::new("email", 0.8, Contains))
                .with_field(FieldConfig::new("phone", 0.6, Contains))
                .with_field(FieldConfig::new("company", 0.7, Contains))
                .with_select(&["id", "name", "email", "phone", "company", "created_at"])
                .with_order_by("name")
                .tenant_scoped("organization_id"),
            Arc::new(CustomerFormatter),
        ),
        (
            "contacts",
            EntityConfig::new("contacts", "Contacts")
                .with_field(FieldConfig::new("name", 1.0, Contains))
                .with_field(FieldConfig::new("email", 0.8, Contains))
                .with_field(FieldConfig::new("phone", 0.6, Contains))
                .with_field(FieldConfig::new("message", 0.4, Fulltext))
                .with_select(&["id", "name", "email", "phone", "subject", "message", "created_at"])
                .with_order_by("created_at DESC")
                .tenant_scoped("organization_id"),
            Arc::new(ContactFormatter),
        ),
        (
            "plans",
            // Plans are publicly searchable
            EntityConfig::new("plans", "Plans")
                .with_field(FieldConfig::new("name", 1.0, Contains))
                .with_field(FieldConfig::new("description", 0.6, Fulltext))
                .with_field(FieldConfig::new("features", 0.4, Contains))
                .with_select(&[
                    "id",
                    "name",
                    "description",
                    "features",
                    "price",
                    "currency",
                    "billing_cycle",
                ])
                .with_where("active = 1")
                .with_order_by("price ASC"),
            Arc::new(PlanFormatter),
        ),
        (
            "emails",
            EntityConfig::new("emails", "Emails")
                .with_field(FieldConfig::new("subject", 1.0, Contains))
                .with_field(FieldConfig::new("to_email", 0.8, Contains))
                .with_field(FieldConfig::new("from_email", 0.6, Contains))
                .with_field(FieldConfig::new("body", 0.4, Fulltext))
                .with_select(&[
                    "id",
                    "subject",
                    "to_email",
                    "from_email",
                    "body",
                    "status",
                    "sent_at",
                ])
                .with_order_by("sent_at DESC")
                .tenant_scoped("organization_id"),
            Arc::new(EmailFormatter),
        ),
    ]
}
