//! Per-entity SQL construction
//!
//! Builds one parameterized SELECT per entity type. Structural fragments
//! (table, joins, static where/order/group clauses) come from the registered
//! `EntityConfig` and are trusted; everything the caller supplies (terms,
//! filter values, tenant and user ids) is bound as a parameter. Filter keys
//! are column names and must be plain identifiers.

use super::config::FuzzySearchConfig;
use super::entity::SearchOptions;
use super::registry::{EntityConfig, FieldConfig, SearchType, is_valid_identifier};
use super::scoring::tokenize;
use crate::error::{Error, Result};
use serde_json::Value;

/// LIKE escape character used in every generated pattern
const LIKE_ESCAPE: char = '!';

/// Terms up to this many characters use a plain substring pattern for fuzzy fields
const FUZZY_SHORT_TERM: usize = 3;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl SqlParam {
    /// Convert a non-null JSON filter value into a parameter
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }
}

/// A SQL statement with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Subsequence pattern for fuzzy fields: `widget` → `%w%i%d%g%e%t%`
pub fn fuzzy_pattern(term: &str) -> String {
    if term.chars().count() <= FUZZY_SHORT_TERM {
        return format!("%{}%", escape_like(term));
    }
    let mut pattern = String::from("%");
    for c in term.chars() {
        pattern.push_str(&escape_like(&c.to_string()));
        pattern.push('%');
    }
    pattern
}

/// GLOB pattern piece matching `c` in either case: `é` → `[éÉ]`.
///
/// SQLite's `LOWER` and `LIKE` only fold ASCII, but GLOB character classes
/// compare whole UTF-8 characters, so listing both cases folds any letter
/// with a single-character case mapping.
fn glob_char(c: char) -> String {
    let mut variants = vec![c];
    for mapped in [c.to_lowercase().collect::<Vec<_>>(), c.to_uppercase().collect()] {
        if let [single] = mapped.as_slice() {
            if !variants.contains(single) {
                variants.push(*single);
            }
        }
    }
    match variants.as_slice() {
        [only] if matches!(only, '*' | '?' | '[') => format!("[{}]", only),
        [only] => only.to_string(),
        _ => format!("[{}]", variants.into_iter().collect::<String>()),
    }
}

/// Case-folding GLOB body for a whole term
pub fn glob_fold(term: &str) -> String {
    term.chars().map(glob_char).collect()
}

/// Case-folding GLOB subsequence pattern, the GLOB twin of [`fuzzy_pattern`]
pub fn fuzzy_glob(term: &str) -> String {
    if term.chars().count() <= FUZZY_SHORT_TERM {
        return format!("*{}*", glob_fold(term));
    }
    let mut pattern = String::from("*");
    for c in term.chars() {
        pattern.push_str(&glob_char(c));
        pattern.push('*');
    }
    pattern
}

/// Reject filter keys that are not plain column identifiers
pub fn validate_filters(options: &SearchOptions) -> Result<()> {
    match options.filters.keys().find(|k| !is_valid_identifier(k)) {
        Some(key) => Err(Error::InvalidInput(format!(
            "filter field '{}' is not a valid column name",
            key
        ))),
        None => Ok(()),
    }
}

/// Accumulates WHERE conditions and their parameters
#[derive(Debug, Default)]
struct WhereBuilder {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl WhereBuilder {
    fn push(&mut self, condition: impl Into<String>, params: impl IntoIterator<Item = SqlParam>) {
        self.conditions.push(condition.into());
        self.params.extend(params);
    }
}

/// Builds the search query for one entity
#[derive(Debug)]
pub struct EntityQueryBuilder<'a> {
    entity: &'a EntityConfig,
    config: &'a FuzzySearchConfig,
}

impl<'a> EntityQueryBuilder<'a> {
    pub fn new(entity: &'a EntityConfig, config: &'a FuzzySearchConfig) -> Self {
        Self { entity, config }
    }

    /// Build the query, or `None` when no field/term pair is eligible.
    ///
    /// An entity with nothing to match contributes zero rows without a
    /// round-trip to the store.
    pub fn build(&self, options: &SearchOptions) -> Result<Option<SqlQuery>> {
        validate_filters(options)?;

        let terms = tokenize(&options.query, self.config.min_search_length);
        let mut search = WhereBuilder::default();
        for field in &self.entity.search_fields {
            for term in &terms {
                if term.chars().count() < field.min_length {
                    continue;
                }
                let (condition, params) = self.field_predicate(field, term);
                search.push(condition, params);
            }
        }
        if search.conditions.is_empty() {
            return Ok(None);
        }

        let mut wb = WhereBuilder::default();

        if let Some(clause) = self.entity.where_clause.as_deref().filter(|c| !c.trim().is_empty()) {
            wb.push(format!("({})", clause), []);
        }

        let permissions = &self.entity.permissions;
        if let (Some(tenant_id), Some(field)) = (options.tenant_id, non_empty(&permissions.tenant_field)) {
            wb.push(format!("{} = ?", field), [SqlParam::Integer(tenant_id)]);
        }
        if let (Some(user_id), Some(field)) = (options.user_id, non_empty(&permissions.ownership_field)) {
            wb.push(format!("{} = ?", field), [SqlParam::Integer(user_id)]);
        }

        // BTreeMap iteration keeps the generated SQL deterministic
        for (field, value) in &options.filters {
            match SqlParam::from_json(value) {
                Some(param) => wb.push(format!("{} = ?", field), [param]),
                None => wb.push(format!("{} IS NULL", field), []),
            }
        }

        wb.push(format!("({})", search.conditions.join(" OR ")), search.params);

        let projection = if self.entity.select_fields.is_empty() {
            "*".to_string()
        } else {
            self.entity.select_fields.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", projection, self.entity.table_name);
        for join in &self.entity.join_tables {
            sql.push_str(&format!(" {} {} ON {}", join.kind.as_sql(), join.table, join.condition));
        }
        sql.push_str(" WHERE ");
        sql.push_str(&wb.conditions.join(" AND "));
        if let Some(group_by) = non_empty(&self.entity.group_by) {
            sql.push_str(&format!(" GROUP BY {}", group_by));
        }
        if let Some(order_by) = non_empty(&self.entity.order_by) {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }

        Ok(Some(SqlQuery {
            sql,
            params: wb.params,
        }))
    }

    /// Predicate for one field and one term
    fn field_predicate(&self, field: &FieldConfig, term: &str) -> (String, Vec<SqlParam>) {
        let case_sensitive = self.config.case_sensitive;
        if !case_sensitive && !term.is_ascii() {
            return Self::folded_predicate(field, &term.to_lowercase());
        }
        let name = field.name.as_str();
        let column = if case_sensitive {
            name.to_string()
        } else {
            format!("LOWER({})", name)
        };
        let term = if case_sensitive {
            term.to_string()
        } else {
            term.to_lowercase()
        };
        let like = |pattern: String| {
            (
                format!("{} LIKE ? ESCAPE '{}'", column, LIKE_ESCAPE),
                vec![SqlParam::Text(pattern)],
            )
        };

        match field.search_type {
            SearchType::Exact => (format!("{} = ?", column), vec![SqlParam::Text(term)]),
            SearchType::Prefix if case_sensitive => {
                (format!("instr({}, ?) = 1", name), vec![SqlParam::Text(term)])
            }
            SearchType::Prefix => like(format!("{}%", escape_like(&term))),
            SearchType::Contains if case_sensitive => {
                (format!("instr({}, ?) > 0", name), vec![SqlParam::Text(term)])
            }
            SearchType::Contains => like(format!("%{}%", escape_like(&term))),
            SearchType::Fulltext => {
                let escaped = escape_like(&term);
                (
                    format!(
                        "({col} LIKE ? ESCAPE '{esc}' OR {col} LIKE ? ESCAPE '{esc}')",
                        col = column,
                        esc = LIKE_ESCAPE
                    ),
                    vec![
                        SqlParam::Text(format!("{}%", escaped)),
                        SqlParam::Text(format!("% {}%", escaped)),
                    ],
                )
            }
            SearchType::Fuzzy => like(fuzzy_pattern(&term)),
        }
    }

    /// Case-insensitive predicate for terms with non-ASCII characters
    fn folded_predicate(field: &FieldConfig, term: &str) -> (String, Vec<SqlParam>) {
        let name = field.name.as_str();
        let glob = |pattern: String| (format!("{} GLOB ?", name), vec![SqlParam::Text(pattern)]);
        let folded = glob_fold(term);

        match field.search_type {
            SearchType::Exact => glob(folded),
            SearchType::Prefix => glob(format!("{}*", folded)),
            SearchType::Contains => glob(format!("*{}*", folded)),
            SearchType::Fulltext => (
                format!("({col} GLOB ? OR {col} GLOB ?)", col = name),
                vec![
                    SqlParam::Text(format!("{}*", folded)),
                    SqlParam::Text(format!("* {}*", folded)),
                ],
            ),
            SearchType::Fuzzy => glob(fuzzy_glob(term)),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::search::registry::{JoinKind, PermissionConfig};

    fn widgets() -> EntityConfig {
        EntityConfig::new("widgets", "Widgets")
            .with_field(FieldConfig::new("title", 1.0, SearchType::Contains))
    }

    fn build(entity: &EntityConfig, options: &SearchOptions) -> Option<SqlQuery> {
        let config = FuzzySearchConfig::default();
        EntityQueryBuilder::new(entity, &config).build(options).unwrap()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_fuzzy_pattern() {
        assert_eq!(fuzzy_pattern("abc"), "%abc%");
        assert_eq!(fuzzy_pattern("widg"), "%w%i%d%g%");
        assert_eq!(fuzzy_pattern("a_b%"), "%a%!_%b%!%%");
    }

    #[test]
    fn test_simple_contains_query() {
        let query = build(&widgets(), &SearchOptions::new("Widget")).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM widgets WHERE (LOWER(title) LIKE ? ESCAPE '!')"
        );
        assert_eq!(query.params, vec![SqlParam::Text("%widget%".into())]);
    }

    #[test]
    fn test_terms_are_never_interpolated() {
        let query = build(&widgets(), &SearchOptions::new("x' OR '1'='1")).unwrap();
        assert!(!query.sql.contains("OR '1'"));
        assert_eq!(query.sql.matches('?').count(), query.params.len());
    }

    #[test]
    fn test_short_query_builds_nothing() {
        assert!(build(&widgets(), &SearchOptions::new("a")).is_none());
        assert!(build(&widgets(), &SearchOptions::new("   ")).is_none());
    }

    #[test]
    fn test_field_min_length_skips_pair() {
        let entity = EntityConfig::new("widgets", "Widgets")
            .with_field(FieldConfig::new("title", 1.0, SearchType::Contains).with_min_length(4))
            .with_field(FieldConfig::new("sku", 1.0, SearchType::Exact));
        let query = build(&entity, &SearchOptions::new("ab abcd")).unwrap();
        // title only gets "abcd", sku gets both
        assert_eq!(query.params.len(), 3);
        assert_eq!(
            query.sql,
            "SELECT * FROM widgets WHERE (LOWER(title) LIKE ? ESCAPE '!' OR LOWER(sku) = ? OR LOWER(sku) = ?)"
        );

        let entity = EntityConfig::new("widgets", "Widgets")
            .with_field(FieldConfig::new("title", 1.0, SearchType::Contains).with_min_length(10));
        assert!(build(&entity, &SearchOptions::new("short")).is_none());
    }

    #[test]
    fn test_full_query_shape() {
        let entity = widgets()
            .with_join("makers", "makers.id = widgets.maker_id", JoinKind::Left)
            .with_select(&["widgets.id", "title"])
            .with_where("widgets.active = 1")
            .with_order_by("title")
            .with_permissions(PermissionConfig {
                require_auth: true,
                tenant_field: Some("org_id".into()),
                ownership_field: Some("owner_id".into()),
                ..Default::default()
            });
        let options = SearchOptions::new("blue")
            .with_filter("status", "live")
            .with_filter("archived_at", Value::Null)
            .with_identity(crate::domain::search::entity::CallerIdentity::user(7, 3));

        let query = build(&entity, &options).unwrap();
        assert_eq!(
            query.sql,
            "SELECT widgets.id, title FROM widgets LEFT JOIN makers ON makers.id = widgets.maker_id \
             WHERE (widgets.active = 1) AND org_id = ? AND owner_id = ? AND archived_at IS NULL \
             AND status = ? AND (LOWER(title) LIKE ? ESCAPE '!') ORDER BY title"
        );
        assert_eq!(
            query.params,
            vec![
                SqlParam::Integer(3),
                SqlParam::Integer(7),
                SqlParam::Text("live".into()),
                SqlParam::Text("%blue%".into()),
            ]
        );
    }

    #[test]
    fn test_tenant_filter_needs_both_id_and_field() {
        let options = SearchOptions {
            tenant_id: Some(3),
            ..SearchOptions::new("blue")
        };
        let query = build(&widgets(), &options).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM widgets WHERE (LOWER(title) LIKE ? ESCAPE '!')"
        );
        assert_eq!(query.params.len(), 1);
    }

    #[test]
    fn test_search_type_predicates() {
        let entity = EntityConfig::new("t", "T")
            .with_field(FieldConfig::new("a", 1.0, SearchType::Exact))
            .with_field(FieldConfig::new("b", 1.0, SearchType::Prefix))
            .with_field(FieldConfig::new("c", 1.0, SearchType::Fulltext))
            .with_field(FieldConfig::new("d", 1.0, SearchType::Fuzzy));
        let query = build(&entity, &SearchOptions::new("Gear")).unwrap();
        assert!(query.sql.contains("LOWER(a) = ?"));
        assert!(query.sql.contains("LOWER(b) LIKE ? ESCAPE '!'"));
        assert!(query.sql.contains("(LOWER(c) LIKE ? ESCAPE '!' OR LOWER(c) LIKE ? ESCAPE '!')"));
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text("gear".into()),
                SqlParam::Text("gear%".into()),
                SqlParam::Text("gear%".into()),
                SqlParam::Text("% gear%".into()),
                SqlParam::Text("%g%e%a%r%".into()),
            ]
        );
    }

    #[test]
    fn test_glob_fold() {
        assert_eq!(glob_fold("école"), "[éÉ][cC][oO][lL][eE]");
        assert_eq!(glob_fold("ß-1"), "ß-1");
        assert_eq!(glob_fold("a*?["), "[aA][*][?][[]");
        assert_eq!(fuzzy_glob("çà"), "*[çÇ][àÀ]*");
        assert_eq!(fuzzy_glob("über"), "*[üÜ]*[bB]*[eE]*[rR]*");
    }

    #[test]
    fn test_non_ascii_terms_fold_case() {
        let entity = EntityConfig::new("t", "T")
            .with_field(FieldConfig::new("a", 1.0, SearchType::Exact))
            .with_field(FieldConfig::new("b", 1.0, SearchType::Prefix))
            .with_field(FieldConfig::new("c", 1.0, SearchType::Contains))
            .with_field(FieldConfig::new("d", 1.0, SearchType::Fulltext));
        let query = build(&entity, &SearchOptions::new("ÉCOLE")).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM t WHERE (a GLOB ? OR b GLOB ? OR c GLOB ? OR (d GLOB ? OR d GLOB ?))"
        );
        let folded = "[éÉ][cC][oO][lL][eE]";
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text(folded.into()),
                SqlParam::Text(format!("{}*", folded)),
                SqlParam::Text(format!("*{}*", folded)),
                SqlParam::Text(format!("{}*", folded)),
                SqlParam::Text(format!("* {}*", folded)),
            ]
        );
    }

    #[test]
    fn test_case_sensitive_predicates() {
        let config = FuzzySearchConfig {
            case_sensitive: true,
            ..Default::default()
        };
        let entity = EntityConfig::new("t", "T")
            .with_field(FieldConfig::new("a", 1.0, SearchType::Prefix))
            .with_field(FieldConfig::new("b", 1.0, SearchType::Contains));
        let query = EntityQueryBuilder::new(&entity, &config)
            .build(&SearchOptions::new("Gear"))
            .unwrap()
            .unwrap();
        assert!(query.sql.contains("instr(a, ?) = 1"));
        assert!(query.sql.contains("instr(b, ?) > 0"));
        assert_eq!(query.params[0], SqlParam::Text("Gear".into()));
    }

    #[test]
    fn test_invalid_filter_key_rejected() {
        let config = FuzzySearchConfig::default();
        let options = SearchOptions::new("blue").with_filter("1=1; --", 1);
        let err = EntityQueryBuilder::new(&widgets(), &config)
            .build(&options)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_filter_param_conversion() {
        assert_eq!(SqlParam::from_json(&Value::from(5)), Some(SqlParam::Integer(5)));
        assert_eq!(SqlParam::from_json(&Value::from(2.5)), Some(SqlParam::Real(2.5)));
        assert_eq!(SqlParam::from_json(&Value::from(true)), Some(SqlParam::Bool(true)));
        assert_eq!(SqlParam::from_json(&Value::Null), None);
    }
}
