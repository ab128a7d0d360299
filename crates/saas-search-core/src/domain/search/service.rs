//! Fuzzy search service
//!
//! Orchestrates a search across registered entity types: access checks,
//! bounded concurrent per-entity queries under a deadline, scoring, the
//! global merge and pagination, and the optional search log.

use super::config::{EngineSettings, FuzzySearchConfig};
use super::entity::{
    CallerIdentity, EntityTypeInfo, HealthReport, PopularQuery, SavedSearch, SearchLog,
    SearchOptions, SearchResponse, SearchResult, SearchStats, SortOrder, TypeAggregation,
    field_timestamp,
};
use super::formatter::{GenericFormatter, ResultFormatter};
use super::query::{EntityQueryBuilder, validate_filters};
use super::registry::{EntityConfig, EntityDefinition, EntityRegistry};
use super::repository::SearchRepository;
use super::repository_trait::SearchRepositoryTrait;
use super::scoring::Scorer;
use super::specification::{MinRelevanceSpec, access_allowed};
use crate::domain::specification::Specification;
use crate::error::{Error, Result};
use futures_util::{StreamExt, stream};
use serde_json::Value;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

/// Page size used by `quick_search` when none is given
pub const QUICK_SEARCH_LIMIT: i64 = 10;

const SERVICE_NAME: &str = "fuzzy_search";

const SEARCH_TIPS: [&str; 3] = [
    "Try using different keywords",
    "Check your spelling",
    "Use more general terms",
];

/// What happened to one entity type during a search
#[derive(Debug)]
enum EntityOutcome {
    /// No eligible predicate, nothing was queried
    Skipped,
    Results(Vec<SearchResult>),
    Failed(Error),
    TimedOut,
}

/// Service for multi-entity fuzzy search
#[derive(Clone)]
pub struct FuzzySearchService {
    repository: Arc<dyn SearchRepositoryTrait>,
    registry: EntityRegistry,
    config: Arc<RwLock<FuzzySearchConfig>>,
    settings: EngineSettings,
}

impl FuzzySearchService {
    /// Create a search service over a SQLite pool
    pub async fn new(pool: SqlitePool, config: FuzzySearchConfig, settings: EngineSettings) -> Self {
        Self::with_repository(Arc::new(SearchRepository::new(pool)), config, settings).await
    }

    /// Create a search service over any repository implementation
    pub async fn with_repository(
        repository: Arc<dyn SearchRepositoryTrait>,
        config: FuzzySearchConfig,
        settings: EngineSettings,
    ) -> Self {
        let registry = EntityRegistry::new();
        if settings.register_defaults {
            registry.register_defaults().await;
        }
        Self {
            repository,
            registry,
            config: Arc::new(RwLock::new(config.sanitized())),
            settings,
        }
    }

    /// The entity registry
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Engine settings this service was built with
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ========== Search ==========

    /// Search every requested (or every registered) entity type
    pub async fn search(&self, options: SearchOptions) -> Result<SearchResponse> {
        let started = Instant::now();
        validate_filters(&options)?;

        let config = self.config.read().await.clone();
        let query = options.query.trim();
        if query.chars().count() < config.min_search_length {
            tracing::debug!(query, "Query shorter than minimum search length");
            return Ok(SearchResponse::empty(options.query.clone(), started.elapsed()));
        }

        let identity = options.identity();
        let access = access_allowed(&identity);
        let definitions: Vec<Arc<EntityDefinition>> = self
            .registry
            .resolve(&options.entity_types)
            .await
            .into_iter()
            .filter(|def| {
                let allowed = access.is_satisfied_by(def);
                if !allowed {
                    tracing::debug!(entity_type = %def.name, "Caller may not search entity type");
                }
                allowed
            })
            .collect();

        let deadline = options
            .timeout
            .or_else(|| self.settings.default_timeout())
            .map(|timeout| started + timeout);

        let mut outcomes: Vec<(usize, EntityOutcome)> = {
            let config = &config;
            let options = &options;
            stream::iter(definitions.iter().cloned().enumerate())
                .map(|(index, def)| async move {
                    (index, self.search_entity(&def, options, config, deadline).await)
                })
                .buffer_unordered(self.settings.concurrency())
                .collect()
                .await
        };
        outcomes.sort_by_key(|(index, _)| *index);

        let mut candidates = Vec::new();
        let mut categories = HashMap::new();
        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            let def = &definitions[index];
            match outcome {
                EntityOutcome::Skipped => {}
                EntityOutcome::Results(results) => {
                    succeeded += 1;
                    categories.insert(def.name.clone(), results.len());
                    candidates.extend(results);
                }
                EntityOutcome::Failed(e) => {
                    tracing::warn!(entity_type = %def.name, error = %e, "Entity search failed, skipping");
                    failures.push(format!("{}: {}", def.name, e));
                }
                EntityOutcome::TimedOut => {
                    tracing::warn!(entity_type = %def.name, "Search deadline reached, skipping entity");
                }
            }
        }

        if succeeded == 0 && !failures.is_empty() {
            return Err(Error::SearchFailed(failures.join("; ")));
        }

        sort_results(&mut candidates, &options);

        let aggregations = options.include_aggregations.then(|| aggregate(&candidates));
        let total = candidates.len();
        let offset = options.offset.max(0) as usize;
        let limit = config.effective_limit(options.limit);
        let results: Vec<SearchResult> = candidates.into_iter().skip(offset).take(limit).collect();

        let suggestions = if results.is_empty() {
            self.empty_result_suggestions().await
        } else {
            Vec::new()
        };

        let elapsed = started.elapsed();
        tracing::debug!(
            query,
            total,
            returned = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        if self.settings.log_searches {
            let searched = definitions.iter().map(|d| d.name.clone()).collect();
            let log = SearchLog::new(query, searched, &identity, total as u32, elapsed);
            if let Err(e) = self.repository.log_search(&log).await {
                tracing::warn!(error = %e, "Failed to record search log");
            }
        }

        Ok(SearchResponse {
            query: options.query,
            total,
            results,
            categories,
            suggestions,
            aggregations,
            execution_time_ms: elapsed.as_millis() as u64,
        })
    }

    async fn search_entity(
        &self,
        def: &EntityDefinition,
        options: &SearchOptions,
        config: &FuzzySearchConfig,
        deadline: Option<Instant>,
    ) -> EntityOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return EntityOutcome::TimedOut;
        }

        let query = match EntityQueryBuilder::new(&def.config, config).build(options) {
            Ok(Some(query)) => query,
            Ok(None) => {
                tracing::debug!(entity_type = %def.name, "No eligible search terms for entity");
                return EntityOutcome::Skipped;
            }
            Err(e) => return EntityOutcome::Failed(e),
        };

        tracing::debug!(
            entity_type = %def.name,
            sql = %query.sql,
            params = query.params.len(),
            "Executing entity query"
        );

        let fetch = self.repository.fetch_rows(&query);
        let rows = match deadline {
            Some(deadline) => match timeout_at(deadline, fetch).await {
                Ok(rows) => rows,
                Err(_) => return EntityOutcome::TimedOut,
            },
            None => fetch.await,
        };

        match rows {
            Ok(rows) => {
                let scorer = Scorer::new(config, &options.query);
                let threshold = MinRelevanceSpec::new(config.score_threshold);
                let results = rows
                    .into_iter()
                    .map(|row| build_result(def, row, &scorer, config, options))
                    .filter(|result| threshold.is_satisfied_by(result))
                    .collect();
                EntityOutcome::Results(results)
            }
            Err(e) => EntityOutcome::Failed(e),
        }
    }

    /// GET-style search: comma-separated types, default page size 10
    pub async fn quick_search(
        &self,
        query: &str,
        types_csv: Option<&str>,
        limit: Option<i64>,
        offset: i64,
        identity: CallerIdentity,
    ) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is required".to_string()));
        }

        let entity_types: Vec<String> = types_csv
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let options = SearchOptions::new(query)
            .with_entity_types(entity_types)
            .with_page(
                offset.max(0),
                limit.filter(|l| *l > 0).unwrap_or(QUICK_SEARCH_LIMIT),
            )
            .with_identity(identity);

        self.search(options).await
    }

    /// Search a single entity type, which must be registered
    pub async fn search_in_entity(
        &self,
        entity_type: &str,
        mut options: SearchOptions,
    ) -> Result<SearchResponse> {
        if self.registry.get(entity_type).await.is_none() {
            return Err(Error::UnknownEntityType {
                name: entity_type.to_string(),
                valid_types: self.registry.names().await,
            });
        }
        options.entity_types = vec![entity_type.to_string()];
        self.search(options).await
    }

    /// Search tips for a query plus per-entity hints
    pub async fn suggestions(&self, query: &str) -> Result<Vec<String>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is required".to_string()));
        }

        let mut suggestions: Vec<String> = SEARCH_TIPS.iter().map(|s| s.to_string()).collect();
        for display_name in self.display_names().await {
            suggestions.push(format!("Search {} by name", display_name));
            suggestions.push(format!("Find {} by email", display_name));
        }
        Ok(suggestions)
    }

    async fn empty_result_suggestions(&self) -> Vec<String> {
        let mut suggestions: Vec<String> = SEARCH_TIPS.iter().map(|s| s.to_string()).collect();
        suggestions.push("Try searching in specific categories".to_string());
        for display_name in self.display_names().await {
            suggestions.push(format!("Search in {}", display_name));
        }
        suggestions
    }

    async fn display_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .definitions()
            .await
            .iter()
            .map(|def| def.config.display_name.clone())
            .collect();
        names.sort();
        names
    }

    // ========== Registry ==========

    /// Register or overwrite an entity type
    pub async fn register_entity(&self, name: &str, config: EntityConfig) -> Result<()> {
        self.registry.register(name, config, None).await
    }

    /// Register or overwrite an entity type with its own result formatter
    pub async fn register_entity_with_formatter(
        &self,
        name: &str,
        config: EntityConfig,
        formatter: Arc<dyn ResultFormatter>,
    ) -> Result<()> {
        self.registry.register(name, config, Some(formatter)).await
    }

    /// Remove an entity type and store the removal.
    ///
    /// A removed registered type stays removed for later services on the
    /// same store, built-in defaults included. Returns whether anything was
    /// removed.
    pub async fn unregister_entity(&self, name: &str) -> Result<bool> {
        let removed = match self.registry.unregister(name).await {
            Some(def) => {
                self.repository.record_entity_removal(name, &def.config).await?;
                true
            }
            None => self.repository.deactivate_entity_definition(name).await?,
        };
        if removed {
            tracing::info!(entity_type = name, "Unregistered search entity");
        }
        Ok(removed)
    }

    /// Snapshot of every registered entity type
    pub async fn get_entity_types(&self) -> HashMap<String, EntityConfig> {
        self.registry.configs().await
    }

    /// Listing view of the registered entity types, sorted by name
    pub async fn entity_type_infos(&self) -> Vec<EntityTypeInfo> {
        self.registry
            .definitions()
            .await
            .iter()
            .map(|def| EntityTypeInfo {
                name: def.name.clone(),
                display_name: def.config.display_name.clone(),
                search_fields: def.config.search_field_names(),
                description: format!("Search within {} records", def.config.display_name),
                require_auth: def.config.permissions.require_auth,
            })
            .collect()
    }

    /// Store an entity's current config so it survives restarts
    pub async fn persist_entity(&self, name: &str) -> Result<()> {
        let def = match self.registry.get(name).await {
            Some(def) => def,
            None => {
                return Err(Error::UnknownEntityType {
                    name: name.to_string(),
                    valid_types: self.registry.names().await,
                });
            }
        };
        self.repository
            .save_entity_definition(name, &def.config)
            .await?;
        tracing::info!(entity_type = name, "Persisted search entity");
        Ok(())
    }

    /// Apply stored removals, then register every stored entity definition.
    /// Invalid definitions are skipped.
    ///
    /// Returns the number registered.
    pub async fn load_persisted_entities(&self) -> Result<usize> {
        for name in self.repository.removed_entity_names().await? {
            if self.registry.unregister(&name).await.is_some() {
                tracing::debug!(entity_type = %name, "Dropped removed search entity");
            }
        }

        let mut loaded = 0;
        for (name, config) in self.repository.load_entity_definitions().await? {
            match self.registry.register(&name, config, None).await {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::warn!(entity_type = %name, error = %e, "Skipping stored entity definition")
                }
            }
        }
        Ok(loaded)
    }

    // ========== Config ==========

    /// The active search configuration
    pub async fn get_config(&self) -> FuzzySearchConfig {
        self.config.read().await.clone()
    }

    /// Replace the search configuration; returns the stored (clamped) value
    pub async fn update_config(&self, config: FuzzySearchConfig) -> FuzzySearchConfig {
        let config = config.sanitized();
        *self.config.write().await = config.clone();
        tracing::info!(
            min_search_length = config.min_search_length,
            max_results = config.max_results,
            score_threshold = config.score_threshold,
            "Updated search configuration"
        );
        config
    }

    // ========== Status ==========

    /// Registry and configuration summary
    pub async fn stats(&self) -> SearchStats {
        let entity_types = self.registry.names().await;
        SearchStats {
            total_entity_types: entity_types.len(),
            entity_types,
            config: self.get_config().await,
            status: "active".to_string(),
        }
    }

    /// Liveness report including the store
    pub async fn health(&self) -> HealthReport {
        let database = match self.repository.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Search store health check failed");
                false
            }
        };
        HealthReport {
            status: if database { "healthy" } else { "degraded" }.to_string(),
            service: SERVICE_NAME.to_string(),
            entity_types: self.registry.len().await,
            database,
            last_check: chrono::Utc::now(),
        }
    }

    // ========== Search Log ==========

    /// A user's most recent searches
    pub async fn search_history(&self, user_id: i64, limit: u32) -> Result<Vec<SearchLog>> {
        self.repository.search_history(user_id, limit).await
    }

    /// The most frequent queries
    pub async fn popular_queries(&self, limit: u32) -> Result<Vec<PopularQuery>> {
        self.repository.popular_queries(limit).await
    }

    // ========== Saved Searches ==========

    /// Store a saved search
    pub async fn save_search(&self, search: SavedSearch) -> Result<SavedSearch> {
        if search.name.trim().is_empty() {
            return Err(Error::InvalidInput("saved search name is required".to_string()));
        }
        if search.query.trim().is_empty() {
            return Err(Error::InvalidInput("saved search query is required".to_string()));
        }
        self.repository.save_saved_search(&search).await?;
        Ok(search)
    }

    /// Saved searches visible to a user in a tenant
    pub async fn list_saved_searches(&self, user_id: i64, tenant_id: i64) -> Result<Vec<SavedSearch>> {
        self.repository.list_saved_searches(user_id, tenant_id).await
    }

    /// Run a saved search as the given caller and record its use
    pub async fn run_saved_search(
        &self,
        id: Uuid,
        identity: CallerIdentity,
    ) -> Result<SearchResponse> {
        let not_found = || Error::SavedSearchNotFound(id.to_string());
        let saved = self.repository.get_saved_search(id).await?.ok_or_else(not_found)?;

        let owner = identity.user_id == Some(saved.user_id);
        let shared = saved.is_public && identity.tenant_id == Some(saved.tenant_id);
        if !owner && !shared {
            return Err(not_found());
        }

        self.repository.touch_saved_search(id).await?;
        self.search(saved.to_options(identity)).await
    }
}

/// Build a scored result for one row
fn build_result(
    def: &EntityDefinition,
    row: super::entity::Row,
    scorer: &Scorer<'_>,
    config: &FuzzySearchConfig,
    options: &SearchOptions,
) -> SearchResult {
    let fields = &def.config.search_fields;
    let formatter: &dyn ResultFormatter = match &def.formatter {
        Some(formatter) => formatter.as_ref(),
        None => &GenericFormatter,
    };

    let (title, description) = formatter.title_description(&def.name, &row);
    let score = scorer.row_score(fields, &row);
    let highlights = if config.enable_highlight {
        scorer.highlights(fields, &row, &options.highlight_fields)
    } else {
        Vec::new()
    };
    let created_at = field_timestamp(&row, "created_at");
    let updated_at = field_timestamp(&row, "updated_at");

    let mut result = SearchResult::new(def.name.clone(), row).with_score(score);
    result.url = result_url(&def.name, &result.id);
    result.title = title;
    result.description = description;
    result.highlights = highlights;
    result.metadata = def.config.metadata.clone();
    result.created_at = created_at;
    result.updated_at = updated_at;
    result
}

fn result_url(entity_type: &str, id: &Value) -> String {
    match id {
        Value::Null => String::new(),
        Value::String(s) => format!("/api/v1/{}/{}", entity_type, s),
        other => format!("/api/v1/{}/{}", entity_type, other),
    }
}

/// Stable sort by the requested key; score descending by default
fn sort_results(results: &mut [SearchResult], options: &SearchOptions) {
    let key = options
        .sort_by
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or("score");
    let default_order = if key == "score" { SortOrder::Desc } else { SortOrder::Asc };
    let order = options.sort_order.unwrap_or(default_order);

    results.sort_by(|a, b| {
        let ordering = match key {
            "score" => a.score.total_cmp(&b.score),
            "title" => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            "type" => a.entity_type.cmp(&b.entity_type),
            "created_at" => a.created_at.cmp(&b.created_at),
            column => compare_values(a.data.get(column), b.data.get(column)),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Order JSON column values: missing/null first, numbers numerically, else as text
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Count, max and mean score per entity type
fn aggregate(results: &[SearchResult]) -> BTreeMap<String, TypeAggregation> {
    let mut sums: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
    for result in results {
        let entry = sums
            .entry(result.entity_type.clone())
            .or_insert((0, f64::MIN, 0.0));
        entry.0 += 1;
        entry.1 = entry.1.max(result.score);
        entry.2 += result.score;
    }
    sums.into_iter()
        .map(|(entity_type, (count, max_score, sum))| {
            (
                entity_type,
                TypeAggregation {
                    count,
                    max_score,
                    avg_score: sum / count as f64,
                },
            )
        })
        .collect()
}
