//! saas-search CLI - multi-entity fuzzy search

use clap::{Args, Parser, Subcommand};
use saas_search_core::Error;
use saas_search_core::config::AppConfig;
use saas_search_core::domain::search::{
    CallerIdentity, EntityConfig, FuzzySearchService, SavedSearch, SearchOptions, SearchResponse,
    SortOrder,
};
use saas_search_core::storage::Database;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;


#[derive(Parser)]
#[command(name = "saas-search")]
#[command(author, version, about = "Multi-entity fuzzy search for SaaS data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file (overrides database.path from the config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Default)]
struct IdentityArgs {
    /// Searching user
    #[arg(long)]
    user_id: Option<i64>,
    /// Tenant of the searching user
    #[arg(long)]
    tenant_id: Option<i64>,
    /// Role of the searching user
    #[arg(long)]
    role: Option<String>,
}

impl IdentityArgs {
    fn identity(&self) -> CallerIdentity {
        CallerIdentity {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            role: self.role.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search across entity types
    Search {
        query: String,
        /// Entity types to search (comma-separated, default all)
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
        /// Equality filter as column=value (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        #[arg(short, long, default_value_t = 0)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// score, title, type, created_at or a column name
        #[arg(long)]
        sort: Option<String>,
        /// asc or desc
        #[arg(long)]
        order: Option<String>,
        /// Include per-type aggregations
        #[arg(long)]
        aggregations: bool,
        /// Deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Quick search with default page size
    Quick {
        query: String,
        /// Entity types (comma-separated)
        #[arg(short, long)]
        types: Option<String>,
        #[arg(short, long)]
        limit: Option<i64>,
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Search tips for a query
    Suggest { query: String },

    /// Manage searchable entity types
    Entities {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Manage saved searches
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },

    /// Show a user's recent searches
    History {
        #[arg(long)]
        user_id: i64,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Show the most frequent queries
    Popular {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Show registry and configuration summary
    Stats,

    /// Check the search service and its store
    Health,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check on config and database
    Doctor,
}

#[derive(Subcommand)]
enum EntityAction {
    /// List entity types
    List,
    /// Show an entity type's configuration
    Show { name: String },
    /// Register (or replace) an entity type from a JSON file and persist it
    Register { name: String, file: PathBuf },
    /// Remove an entity type
    Unregister { name: String },
}

#[derive(Subcommand)]
enum SavedAction {
    /// Save a search
    Create {
        name: String,
        query: String,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        tenant_id: i64,
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Share with the whole tenant
        #[arg(long)]
        public: bool,
    },
    /// List saved searches visible to a user
    List {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        tenant_id: i64,
    },
    /// Run a saved search
    Run {
        id: Uuid,
        #[command(flatten)]
        identity: IdentityArgs,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("saas_search=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<Error>() {
                eprintln!("Error [{}]: {}", err.code(), err);
                if let Some(hint) = err.suggestion() {
                    eprintln!("Hint: {}", hint);
                }
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        format,
        quiet,
        database,
    } = cli;

    let command = match command {
        Commands::Config { action } => return cmd_config(action, quiet),
        other => other,
    };

    let config = AppConfig::load()?;
    let db_path = database.unwrap_or_else(|| config.database.path.clone());

    if matches!(command, Commands::Doctor) {
        return cmd_doctor(&config, db_path, quiet).await;
    }

    let db = Database::open(db_path).await?;
    let result = match open_service(&db, &config).await {
        Ok(service) => dispatch(&service, command, format, quiet).await,
        Err(e) => Err(e),
    };
    // Close on the error path too
    db.close().await;
    result
}

/// Run one store-backed command
async fn dispatch(
    service: &FuzzySearchService,
    command: Commands,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Search {
            query,
            types,
            filters,
            limit,
            offset,
            sort,
            order,
            aggregations,
            timeout,
            identity,
        } => {
            let mut options = SearchOptions::new(query)
                .with_entity_types(types)
                .with_page(offset, limit)
                .with_identity(identity.identity());
            for filter in &filters {
                let (field, value) = parse_filter(filter)?;
                options = options.with_filter(field, value);
            }
            options.sort_by = sort;
            options.sort_order = order.as_deref().map(SortOrder::parse);
            options.include_aggregations = aggregations;
            if let Some(secs) = timeout {
                options = options.with_timeout(Duration::from_secs(secs));
            }
            let response = service.search(options).await?;
            print_response(&response, format, quiet)
        }

        Commands::Quick {
            query,
            types,
            limit,
            identity,
        } => {
            let response = service
                .quick_search(&query, types.as_deref(), limit, 0, identity.identity())
                .await?;
            print_response(&response, format, quiet)
        }

        Commands::Suggest { query } => {
            let suggestions = service.suggestions(&query).await?;
            match format {
                OutputFormat::Json => print_json(&suggestions),
                OutputFormat::Text => {
                    for s in suggestions {
                        println!("  {}", s);
                    }
                    Ok(())
                }
            }
        }

        Commands::Entities { action } => cmd_entities(service, action, format, quiet).await,

        Commands::Saved { action } => cmd_saved(service, action, format, quiet).await,

        Commands::History { user_id, limit } => {
            let history = service.search_history(user_id, limit).await?;
            match format {
                OutputFormat::Json => print_json(&history),
                OutputFormat::Text => {
                    if history.is_empty() && !quiet {
                        println!("No searches recorded for user {}.", user_id);
                        println!("\nEnable logging with: saas-search config set engine.log_searches true");
                    }
                    for log in history {
                        println!(
                            "  {}  {:<30} {} results ({})",
                            log.created_at.format("%Y-%m-%d %H:%M:%S"),
                            log.query,
                            log.results_count,
                            log.entity_types.join(", ")
                        );
                    }
                    Ok(())
                }
            }
        }

        Commands::Popular { limit } => {
            let popular = service.popular_queries(limit).await?;
            match format {
                OutputFormat::Json => print_json(&popular),
                OutputFormat::Text => {
                    for q in popular {
                        println!("  {:>5}  {}", q.count, q.query);
                    }
                    Ok(())
                }
            }
        }

        Commands::Stats => {
            let stats = service.stats().await;
            match format {
                OutputFormat::Json => print_json(&stats),
                OutputFormat::Text => {
                    println!("Status: {}", stats.status);
                    println!("Entity types ({}): {}", stats.total_entity_types, stats.entity_types.join(", "));
                    println!("Min search length: {}", stats.config.min_search_length);
                    println!("Max results: {}", stats.config.max_results);
                    println!("Score threshold: {}", stats.config.score_threshold);
                    Ok(())
                }
            }
        }

        Commands::Health => {
            let health = service.health().await;
            match format {
                OutputFormat::Json => print_json(&health),
                OutputFormat::Text => {
                    println!("Service: {}", health.service);
                    println!("Status: {}", health.status);
                    println!("Database: {}", if health.database { "ok" } else { "unreachable" });
                    println!("Entity types: {}", health.entity_types);
                    Ok(())
                }
            }
        }

        Commands::Config { .. } | Commands::Doctor => Ok(()),
    }
}

/// Build the search service and register every persisted entity type
async fn open_service(db: &Database, config: &AppConfig) -> anyhow::Result<FuzzySearchService> {
    let service =
        FuzzySearchService::new(db.pool().clone(), config.search.clone(), config.engine.clone())
            .await;
    let loaded = service.load_persisted_entities().await?;
    debug!(loaded, "Loaded persisted entity types");
    Ok(service)
}

/// Parse `column=value`; the value is read as JSON when possible, else as text
fn parse_filter(raw: &str) -> anyhow::Result<(String, Value)> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid filter '{}': expected column=value", raw))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(anyhow::anyhow!("Invalid filter '{}': missing column", raw));
    }
    let value = serde_json::from_str(value.trim()).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_response(response: &SearchResponse, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(response);
    }

    if !quiet {
        println!(
            "Found {} results for '{}' ({}ms)",
            response.total, response.query, response.execution_time_ms
        );
    }
    for result in &response.results {
        println!("  [{}] {} ({:.2})", result.entity_type, result.title, result.score);
        if !quiet {
            if !result.description.is_empty() {
                println!("      {}", result.description);
            }
            for highlight in &result.highlights {
                println!("      > {}", highlight);
            }
        }
    }

    if quiet {
        return Ok(());
    }
    if !response.categories.is_empty() {
        let mut categories: Vec<_> = response.categories.iter().collect();
        categories.sort();
        let summary: Vec<String> = categories
            .into_iter()
            .map(|(name, count)| format!("{}={}", name, count))
            .collect();
        println!("Categories: {}", summary.join(", "));
    }
    if let Some(aggregations) = &response.aggregations {
        println!("Aggregations:");
        for (name, agg) in aggregations {
            println!(
                "  {}: {} results, max {:.2}, avg {:.2}",
                name, agg.count, agg.max_score, agg.avg_score
            );
        }
    }
    if !response.suggestions.is_empty() {
        println!("Suggestions:");
        for s in &response.suggestions {
            println!("  - {}", s);
        }
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_entities(
    service: &FuzzySearchService,
    action: EntityAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        EntityAction::List => {
            let infos = service.entity_type_infos().await;
            if format == OutputFormat::Json {
                return print_json(&infos);
            }
            if infos.is_empty() {
                if !quiet {
                    println!("No entity types registered.");
                    println!("\nRegister one with: saas-search entities register <name> <config.json>");
                }
                return Ok(());
            }
            if !quiet {
                println!("Entity types:");
            }
            for info in infos {
                let auth = if info.require_auth { " [auth]" } else { "" };
                println!(
                    "  {} - {} ({}){}",
                    info.name,
                    info.display_name,
                    info.search_fields.join(", "),
                    auth
                );
            }
        }
        EntityAction::Show { name } => {
            let def = service.registry().get(&name).await.ok_or_else(|| {
                anyhow::anyhow!(
                    "Entity type '{}' not found. Run `saas-search entities list` to see all types.",
                    name
                )
            })?;
            if format == OutputFormat::Json {
                return print_json(&def.config);
            }
            let config = &def.config;
            println!("Entity: {}", def.name);
            println!("  Display name: {}", config.display_name);
            println!("  Table: {}", config.table_name);
            println!("  Search fields:");
            for field in &config.search_fields {
                println!(
                    "    {} ({}, weight {}, boost {})",
                    field.name, field.search_type, field.weight, field.boost
                );
            }
            if let Some(clause) = &config.where_clause {
                println!("  Where: {}", clause);
            }
            if let Some(order_by) = &config.order_by {
                println!("  Order by: {}", order_by);
            }
            println!("  Requires auth: {}", config.permissions.require_auth);
            if let Some(tenant_field) = &config.permissions.tenant_field {
                println!("  Tenant column: {}", tenant_field);
            }
        }
        EntityAction::Register { name, file } => {
            let contents = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let config: EntityConfig = serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Invalid entity config in {}: {}", file.display(), e))?;
            service.register_entity(&name, config).await?;
            service.persist_entity(&name).await?;
            info!(entity_type = %name, "Entity type registered from file");
            if !quiet {
                println!("Entity type '{}' registered.", name);
            }
        }
        EntityAction::Unregister { name } => {
            if service.unregister_entity(&name).await? {
                if !quiet {
                    println!("Entity type '{}' removed.", name);
                }
            } else {
                return Err(anyhow::anyhow!(
                    "Entity type '{}' not found. Run `saas-search entities list` to see all types.",
                    name
                ));
            }
        }
    }
    Ok(())
}

async fn cmd_saved(
    service: &FuzzySearchService,
    action: SavedAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        SavedAction::Create {
            name,
            query,
            user_id,
            tenant_id,
            types,
            description,
            public,
        } => {
            let mut search =
                SavedSearch::new(name, query, user_id, tenant_id).with_entity_types(types);
            search.description = description;
            if public {
                search = search.public();
            }
            let saved = service.save_search(search).await?;
            match format {
                OutputFormat::Json => print_json(&saved)?,
                OutputFormat::Text => {
                    if !quiet {
                        println!("Saved search '{}' created.", saved.name);
                    }
                    println!("{}", saved.id);
                }
            }
        }
        SavedAction::List { user_id, tenant_id } => {
            let searches = service.list_saved_searches(user_id, tenant_id).await?;
            if format == OutputFormat::Json {
                return print_json(&searches);
            }
            if searches.is_empty() && !quiet {
                println!("No saved searches.");
            }
            for s in searches {
                let shared = if s.is_public { " [public]" } else { "" };
                println!("  {} - {}: '{}' (used {}){}", s.id, s.name, s.query, s.use_count, shared);
            }
        }
        SavedAction::Run { id, identity } => {
            let response = service.run_saved_search(id, identity.identity()).await?;
            print_response(&response, format, quiet)?;
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = AppConfig::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = AppConfig::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = AppConfig::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            AppConfig::default().save()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = AppConfig::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &AppConfig, db_path: PathBuf, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("saas-search Health Check");
        println!("========================");
        println!();
        println!("[OK] Configuration: Valid");
        match AppConfig::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    let mut all_ok = true;

    match Database::open(db_path).await {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Database: Connected");
                        if let Some(path) = db.path() {
                            println!("     Path: {}", path.display());
                        }
                    }
                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => {
                            all_ok = false;
                            if !quiet {
                                println!(
                                    "[!!] Database: Migrations pending (v{} -> v{})",
                                    status.current_version, status.target_version
                                );
                            }
                        }
                        Ok(status) => {
                            if !quiet {
                                println!("[OK] Database: Schema v{}", status.current_version);
                            }
                        }
                        Err(e) => {
                            all_ok = false;
                            if !quiet {
                                println!("[!!] Database: Migration check failed - {}", e);
                            }
                        }
                    }
                    if let Ok(service) = open_service(&db, config).await {
                        if !quiet {
                            println!("     Entity types: {}", service.registry().len().await);
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: Health check failed - {}", e);
                    }
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}
