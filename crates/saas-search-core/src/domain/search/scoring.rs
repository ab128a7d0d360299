//! Relevance scoring and highlighting
//!
//! Scores are a weighted sum over search fields. Each field takes the best
//! score of any query term: exact match, prefix match, substring match, or
//! a character-overlap heuristic for near misses. The heuristic is
//! deliberately approximate; it is not an edit distance.

use super::config::FuzzySearchConfig;
use super::entity::{Row, field_text};
use super::registry::FieldConfig;

/// Score for a term found anywhere inside a field value
pub const CONTAINS_SCORE: f64 = 1.0;

/// Overlap ratio below which a near miss scores nothing
pub const FUZZY_MIN_RATIO: f64 = 0.5;

/// Multiplier applied to the overlap ratio of a near miss
pub const FUZZY_WEIGHT: f64 = 0.5;

/// Terms shorter than this never score as near misses
pub const FUZZY_MIN_TERM_LEN: usize = 3;

const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";

/// Split a query on whitespace, dropping terms shorter than `min_len` characters
pub fn tokenize(query: &str, min_len: usize) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|term| term.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// Character-overlap score of a term against a value
///
/// Both inputs are expected to be case-normalized already.
pub fn fuzzy_score(value: &str, term: &str) -> f64 {
    let term_len = term.chars().count();
    if term_len < FUZZY_MIN_TERM_LEN {
        return 0.0;
    }
    let matches = term.chars().filter(|c| value.contains(*c)).count();
    let ratio = matches as f64 / term_len as f64;
    if ratio < FUZZY_MIN_RATIO {
        0.0
    } else {
        ratio * FUZZY_WEIGHT
    }
}

/// Scores rows for one query under one configuration
#[derive(Debug, Clone)]
pub struct Scorer<'a> {
    config: &'a FuzzySearchConfig,
    terms: Vec<String>,
}

impl<'a> Scorer<'a> {
    /// Tokenize the query with the configured minimum length
    pub fn new(config: &'a FuzzySearchConfig, query: &str) -> Self {
        Self {
            config,
            terms: tokenize(query, config.min_search_length),
        }
    }

    /// The query terms being scored
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    fn normalize(&self, s: &str) -> String {
        if self.config.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }

    /// Score one term against a normalized value, before field boost
    fn term_score(&self, value: &str, term: &str) -> f64 {
        if value == term {
            self.config.exact_match_boost
        } else if value.starts_with(term) {
            self.config.prefix_match_boost
        } else if value.contains(term) {
            CONTAINS_SCORE
        } else {
            fuzzy_score(value, term)
        }
    }

    /// Best score of any term against a field value, including the field boost
    pub fn field_score(&self, field: &FieldConfig, value: &str) -> f64 {
        let value = self.normalize(value);
        self.terms
            .iter()
            .map(|term| self.term_score(&value, &self.normalize(term)) * (1.0 + field.boost))
            .fold(0.0, f64::max)
    }

    /// Weighted relevance of a row across the search fields
    pub fn row_score(&self, fields: &[FieldConfig], row: &Row) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let total: f64 = fields
            .iter()
            .filter_map(|field| {
                let value = field_text(row, &field.name);
                (!value.is_empty()).then(|| self.field_score(field, &value) * field.weight)
            })
            .sum();
        total.max(0.0)
    }

    /// Highlighted values of the search fields that contain a term.
    ///
    /// `only` restricts highlighting to the named fields when non-empty.
    pub fn highlights(&self, fields: &[FieldConfig], row: &Row, only: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter(|field| only.is_empty() || only.iter().any(|name| *name == field.name))
            .filter_map(|field| {
                let value = field_text(row, &field.name);
                if value.is_empty() {
                    return None;
                }
                let highlighted = self.highlight_text(&value);
                (highlighted != value).then_some(highlighted)
            })
            .collect()
    }

    /// Wrap every occurrence of any term in `<mark>` tags.
    ///
    /// Overlapping matches of different terms merge into one marked span and
    /// the original casing of the text is preserved.
    pub fn highlight_text(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut marked = vec![false; chars.len()];

        for term in &self.terms {
            let term_chars: Vec<char> = term.chars().collect();
            if term_chars.is_empty() || term_chars.len() > chars.len() {
                continue;
            }
            for start in 0..=chars.len() - term_chars.len() {
                let window = &chars[start..start + term_chars.len()];
                if self.chars_match(window, &term_chars) {
                    marked[start..start + term_chars.len()].fill(true);
                }
            }
        }

        let mut out = String::with_capacity(text.len() + MARK_OPEN.len() + MARK_CLOSE.len());
        let mut in_mark = false;
        for (c, is_marked) in chars.iter().zip(&marked) {
            if *is_marked && !in_mark {
                out.push_str(MARK_OPEN);
            } else if !*is_marked && in_mark {
                out.push_str(MARK_CLOSE);
            }
            in_mark = *is_marked;
            out.push(*c);
        }
        if in_mark {
            out.push_str(MARK_CLOSE);
        }
        out
    }

    fn chars_match(&self, window: &[char], term: &[char]) -> bool {
        if self.config.case_sensitive {
            window == term
        } else {
            window
                .iter()
                .zip(term)
                .all(|(a, b)| a == b || a.to_lowercase().eq(b.to_lowercase()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::search::registry::SearchType;
    use serde_json::json;

    fn config() -> FuzzySearchConfig {
        FuzzySearchConfig::default()
    }

    fn field(name: &str) -> FieldConfig {
        FieldConfig::new(name, 1.0, SearchType::Contains)
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tokenize_drops_short_terms() {
        assert_eq!(tokenize("  a bb  ccc ", 2), vec!["bb", "ccc"]);
        assert!(tokenize("a b", 2).is_empty());
        assert!(tokenize("", 1).is_empty());
        // Character count, not bytes
        assert_eq!(tokenize("é ü", 2), Vec::<String>::new());
    }

    #[test]
    fn test_match_kind_ordering() {
        let config = config();
        let scorer = Scorer::new(&config, "acme");
        let f = field("name");

        let exact = scorer.field_score(&f, "Acme");
        let prefix = scorer.field_score(&f, "Acme Corp");
        let contains = scorer.field_score(&f, "The Acme Corp");
        let fuzzy = scorer.field_score(&f, "Mace");
        let none = scorer.field_score(&f, "Zzz");

        assert_eq!(exact, 2.0);
        assert_eq!(prefix, 1.5);
        assert_eq!(contains, 1.0);
        assert!(fuzzy > 0.0 && fuzzy <= 0.5);
        assert_eq!(none, 0.0);
        assert!(exact >= prefix && prefix >= contains && contains >= fuzzy);
    }

    #[test]
    fn test_exact_beats_prefix_scenario() {
        let config = FuzzySearchConfig {
            exact_match_boost: 2.0,
            prefix_match_boost: 1.5,
            ..Default::default()
        };
        let f = field("name");
        let exact = Scorer::new(&config, "acme").field_score(&f, "Acme");
        let prefix = Scorer::new(&config, "ac").field_score(&f, "Acme");
        assert!(exact > prefix);
    }

    #[test]
    fn test_fuzzy_score_curve() {
        assert_eq!(fuzzy_score("anything", "ab"), 0.0);
        // 3 of 4 characters present
        assert_eq!(fuzzy_score("wdgt", "wxdg"), 0.75 * 0.5);
        // 1 of 4 below the ratio floor
        assert_eq!(fuzzy_score("w", "wxyz"), 0.0);
        assert_eq!(fuzzy_score("abcd", "dcba"), 0.5);
    }

    #[test]
    fn test_boost_and_best_term() {
        let config = config();
        let scorer = Scorer::new(&config, "zzz acme");
        let boosted = field("name").with_boost(1.0);
        assert_eq!(scorer.field_score(&boosted, "acme"), 4.0);
    }

    #[test]
    fn test_case_sensitive_scoring() {
        let config = FuzzySearchConfig {
            case_sensitive: true,
            ..Default::default()
        };
        let scorer = Scorer::new(&config, "acme");
        let f = field("name");
        assert_eq!(scorer.field_score(&f, "acme"), 2.0);
        assert!(scorer.field_score(&f, "Acme") < 1.0);
    }

    #[test]
    fn test_row_score_weights_and_skips_empty() {
        let config = config();
        let scorer = Scorer::new(&config, "acme");
        let fields = vec![
            FieldConfig::new("name", 1.0, SearchType::Contains),
            FieldConfig::new("email", 0.5, SearchType::Contains),
            FieldConfig::new("company", 0.7, SearchType::Contains),
        ];
        let r = row(json!({"name": "Acme", "email": "hi@acme.test", "company": null}));
        assert_eq!(scorer.row_score(&fields, &r), 2.0 + 0.5);
    }

    #[test]
    fn test_row_score_without_terms_is_zero() {
        let config = config();
        let scorer = Scorer::new(&config, "a");
        let r = row(json!({"name": "a"}));
        assert_eq!(scorer.row_score(&[field("name")], &r), 0.0);
    }

    #[test]
    fn test_highlight_preserves_case_and_marks_all() {
        let config = config();
        let scorer = Scorer::new(&config, "widget");
        assert_eq!(
            scorer.highlight_text("Widget and widget"),
            "<mark>Widget</mark> and <mark>widget</mark>"
        );
    }

    #[test]
    fn test_highlight_merges_overlapping_terms() {
        let config = config();
        let scorer = Scorer::new(&config, "blue lue widget");
        assert_eq!(
            scorer.highlight_text("Blue Widget"),
            "<mark>Blue</mark> <mark>Widget</mark>"
        );
        let scorer = Scorer::new(&config, "mark");
        assert_eq!(scorer.highlight_text("Bookmark"), "Book<mark>mark</mark>");
    }

    #[test]
    fn test_highlights_only_changed_and_selected_fields() {
        let config = config();
        let scorer = Scorer::new(&config, "acme");
        let fields = vec![field("name"), field("email"), field("phone")];
        let r = row(json!({"name": "Acme", "email": "hi@acme.test", "phone": "555"}));

        let all = scorer.highlights(&fields, &r, &[]);
        assert_eq!(all, vec!["<mark>Acme</mark>", "hi@<mark>acme</mark>.test"]);

        let only_email = scorer.highlights(&fields, &r, &["email".to_string()]);
        assert_eq!(only_email, vec!["hi@<mark>acme</mark>.test"]);
    }
}
