//! Search configuration
//!
//! `FuzzySearchConfig` tunes matching and scoring and can be replaced at
//! runtime by an administrator. `EngineSettings` controls how the service
//! executes searches and is fixed for the lifetime of a service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum query/term length
pub const DEFAULT_MIN_SEARCH_LENGTH: usize = 2;

/// Default page size ceiling
pub const DEFAULT_MAX_RESULTS: i64 = 50;

/// Matching and scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzySearchConfig {
    /// Minimum query length; shorter terms are dropped during tokenization
    pub min_search_length: usize,
    /// Maximum number of results returned in one page
    pub max_results: i64,
    /// Minimum relevance score for a row to become a result
    pub score_threshold: f64,
    /// Wrap matching terms in `<mark>` tags
    pub enable_highlight: bool,
    /// Match and score without case folding
    pub case_sensitive: bool,
    /// Score for a field value equal to a term
    pub exact_match_boost: f64,
    /// Score for a field value starting with a term
    pub prefix_match_boost: f64,
    /// Reserved, no effect
    pub enable_stemming: bool,
    /// Reserved, no effect
    pub enable_synonyms: bool,
}

impl Default for FuzzySearchConfig {
    fn default() -> Self {
        Self {
            min_search_length: DEFAULT_MIN_SEARCH_LENGTH,
            max_results: DEFAULT_MAX_RESULTS,
            score_threshold: 0.1,
            enable_highlight: true,
            case_sensitive: false,
            exact_match_boost: 2.0,
            prefix_match_boost: 1.5,
            enable_stemming: false,
            enable_synonyms: false,
        }
    }
}

impl FuzzySearchConfig {
    /// Clamp out-of-range values to safe defaults.
    ///
    /// Updates are lenient: a bad value is corrected rather than rejected.
    pub fn sanitized(mut self) -> Self {
        if self.min_search_length < 1 {
            self.min_search_length = 1;
        }
        if self.max_results <= 0 {
            self.max_results = DEFAULT_MAX_RESULTS;
        }
        if self.score_threshold.is_nan() || self.score_threshold < 0.0 {
            self.score_threshold = 0.0;
        }
        self
    }

    /// Resolve a requested page size against `max_results`
    pub fn effective_limit(&self, requested: i64) -> usize {
        if requested <= 0 || requested > self.max_results {
            self.max_results.max(0) as usize
        } else {
            requested as usize
        }
    }
}

/// Execution settings for a search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Register users, customers, contacts, plans and emails on construction
    pub register_defaults: bool,
    /// Maximum entity queries in flight for one search
    pub max_concurrent_queries: usize,
    /// Deadline applied when the caller does not supply one (seconds, 0 = none)
    pub default_timeout_secs: u64,
    /// Record each search in `fuzzy_search_logs`
    pub log_searches: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            register_defaults: true,
            max_concurrent_queries: 4,
            default_timeout_secs: 10,
            log_searches: false,
        }
    }
}

impl EngineSettings {
    /// Default per-request timeout, if any
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }

    /// Concurrency bound, never zero
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_queries.max(1)
    }
}
