//! Configuration management with file persistence

use crate::domain::search::{EngineSettings, FuzzySearchConfig};
use crate::storage::default_database_path;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "SAAS_SEARCH_CONFIG_DIR";

/// Every key accepted by `get`/`set`
pub const CONFIG_KEYS: [&str; 14] = [
    "database.path",
    "search.min_search_length",
    "search.max_results",
    "search.score_threshold",
    "search.enable_highlight",
    "search.case_sensitive",
    "search.exact_match_boost",
    "search.prefix_match_boost",
    "search.enable_stemming",
    "search.enable_synonyms",
    "engine.register_defaults",
    "engine.max_concurrent_queries",
    "engine.default_timeout_secs",
    "engine.log_searches",
];

/// saas-search configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub search: FuzzySearchConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

impl AppConfig {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("saas-search")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a file, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let search = &self.search;
        if search.min_search_length == 0 {
            return Err(anyhow!("search.min_search_length must be at least 1"));
        }
        if search.max_results <= 0 {
            return Err(anyhow!("search.max_results must be positive"));
        }
        if !search.score_threshold.is_finite() || search.score_threshold < 0.0 {
            return Err(anyhow!("search.score_threshold must be a non-negative number"));
        }
        for (key, boost) in [
            ("search.exact_match_boost", search.exact_match_boost),
            ("search.prefix_match_boost", search.prefix_match_boost),
        ] {
            if !boost.is_finite() || boost < 0.0 {
                return Err(anyhow!("{} must be a non-negative number", key));
            }
        }
        if self.engine.max_concurrent_queries == 0 {
            return Err(anyhow!("engine.max_concurrent_queries must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let search = &self.search;
        let engine = &self.engine;
        let value = match key {
            "database.path" => self.database.path.display().to_string(),

            "search.min_search_length" => search.min_search_length.to_string(),
            "search.max_results" => search.max_results.to_string(),
            "search.score_threshold" => search.score_threshold.to_string(),
            "search.enable_highlight" => search.enable_highlight.to_string(),
            "search.case_sensitive" => search.case_sensitive.to_string(),
            "search.exact_match_boost" => search.exact_match_boost.to_string(),
            "search.prefix_match_boost" => search.prefix_match_boost.to_string(),
            "search.enable_stemming" => search.enable_stemming.to_string(),
            "search.enable_synonyms" => search.enable_synonyms.to_string(),

            "engine.register_defaults" => engine.register_defaults.to_string(),
            "engine.max_concurrent_queries" => engine.max_concurrent_queries.to_string(),
            "engine.default_timeout_secs" => engine.default_timeout_secs.to_string(),
            "engine.log_searches" => engine.log_searches.to_string(),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `saas-search config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    ///
    /// The change is validated; an invalid value leaves the config unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut updated = self.clone();
        let search = &mut updated.search;
        let engine = &mut updated.engine;
        match key {
            "database.path" => updated.database.path = PathBuf::from(value.trim()),

            "search.min_search_length" => search.min_search_length = parse(key, value)?,
            "search.max_results" => search.max_results = parse(key, value)?,
            "search.score_threshold" => search.score_threshold = parse(key, value)?,
            "search.enable_highlight" => search.enable_highlight = parse(key, value)?,
            "search.case_sensitive" => search.case_sensitive = parse(key, value)?,
            "search.exact_match_boost" => search.exact_match_boost = parse(key, value)?,
            "search.prefix_match_boost" => search.prefix_match_boost = parse(key, value)?,
            "search.enable_stemming" => search.enable_stemming = parse(key, value)?,
            "search.enable_synonyms" => search.enable_synonyms = parse(key, value)?,

            "engine.register_defaults" => engine.register_defaults = parse(key, value)?,
            "engine.max_concurrent_queries" => engine.max_concurrent_queries = parse(key, value)?,
            "engine.default_timeout_secs" => engine.default_timeout_secs = parse(key, value)?,
            "engine.log_searches" => engine.log_searches = parse(key, value)?,

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `saas-search config list` to see available keys.",
                    key
                ));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        CONFIG_KEYS
            .iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}
