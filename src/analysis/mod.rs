//! Heuristic understanding of natural-language country questions.
//!
//! Classification is keyword driven: an intent, a complexity tier and a set of
//! extracted entities are derived from the lower-cased question and the
//! [`KeywordTables`]. The same input always produces the same analysis.

pub mod keywords;
pub mod templates;
pub mod validation;

pub use keywords::KeywordTables;

use crate::config::QueryConfig;
use config::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

pub const DEFAULT_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Geographic,
    Population,
    Language,
    Flag,
    Currency,
    Size,
    Border,
    Complex,
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::Geographic => "geographic",
            Intent::Population => "population",
            Intent::Language => "language",
            Intent::Flag => "flag",
            Intent::Currency => "currency",
            Intent::Size => "size",
            Intent::Border => "border",
            Intent::Complex => "complex",
            Intent::General => "general",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        })
    }
}

/// Dictionary matches, in dictionary order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub regions: Vec<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub colors: Vec<String>,
    pub numbers: Vec<u64>,
    pub comparisons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub complexity: Complexity,
    pub entities: Entities,
    pub confidence: f32,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    tables: KeywordTables,
    confidence: f32,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(KeywordTables::default(), DEFAULT_CONFIDENCE)
    }
}

impl QueryAnalyzer {
    pub fn new(tables: KeywordTables, confidence: f32) -> Self {
        Self {
            tables,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Result<Self, ConfigError> {
        let tables = match &config.keywords {
            Some(path) => KeywordTables::from_file(path)?,
            None => KeywordTables::default(),
        };
        Ok(Self::new(tables, config.confidence))
    }

    pub fn tables(&self) -> &KeywordTables {
        &self.tables
    }

    pub fn classify(&self, query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();

        let mut analysis = QueryAnalysis {
            intent: self.classify_intent(&lower),
            complexity: assess_complexity(&lower),
            entities: self.extract_entities(&lower),
            confidence: self.confidence,
            suggestions: Vec::new(),
        };
        analysis.suggestions = suggestions_for(&analysis);

        debug!(
            intent = %analysis.intent,
            complexity = %analysis.complexity,
            "Query analysis: {:?}",
            analysis.entities
        );
        analysis
    }

    /// First intent, in table order, with a keyword contained in `lower`.
    pub fn classify_intent(&self, lower: &str) -> Intent {
        self.tables
            .intents
            .iter()
            .find(|entry| contains_any(lower, &entry.keywords))
            .map(|entry| entry.intent)
            .unwrap_or(Intent::General)
    }

    pub fn extract_entities(&self, lower: &str) -> Entities {
        let matches = |dictionary: &[String]| -> Vec<String> {
            dictionary
                .iter()
                .filter(|word| lower.contains(word.as_str()))
                .cloned()
                .collect()
        };

        Entities {
            regions: matches(&self.tables.regions),
            countries: matches(&self.tables.countries),
            languages: matches(&self.tables.languages),
            colors: matches(&self.tables.colors),
            numbers: DIGIT_RUN
                .find_iter(lower)
                .filter_map(|m| m.as_str().parse::<u64>().ok())
                .collect(),
            comparisons: matches(&self.tables.comparisons),
        }
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword.as_str()))
}

/// Sums independent signals over the lower-cased query and buckets the score.
pub fn assess_complexity(lower: &str) -> Complexity {
    let mut score = 0;

    if lower.contains("and") || lower.contains("or") {
        score += 1;
    }
    if lower.contains("but") || lower.contains("except") {
        score += 1;
    }
    if lower.contains("compare") || lower.contains("vs") {
        score += 2;
    }
    if lower.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if lower.split(' ').count() > 10 {
        score += 1;
    }

    match score {
        s if s >= 4 => Complexity::High,
        s if s >= 2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

fn suggestions_for(analysis: &QueryAnalysis) -> Vec<String> {
    let mut suggestions = Vec::new();
    let entities = &analysis.entities;

    match analysis.intent {
        Intent::Geographic if entities.regions.is_empty() => {
            suggestions.push("Consider specifying a region like 'Europe' or 'Asia'".to_string());
        }
        Intent::Population if entities.numbers.is_empty() => {
            suggestions
                .push("You can specify population thresholds like 'over 100 million'".to_string());
        }
        Intent::Language if entities.languages.is_empty() => {
            suggestions.push("Try specifying a language like 'Spanish' or 'French'".to_string());
        }
        _ => {}
    }

    if analysis.complexity == Complexity::High {
        suggestions
            .push("This is a complex query. Consider breaking it into simpler parts.".to_string());
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(query: &str) -> QueryAnalysis {
        QueryAnalyzer::default().classify(query)
    }

    #[test]
    fn countries_in_europe() {
        let analysis = classify("Countries in Europe");
        assert_eq!(analysis.intent, Intent::Geographic);
        assert_eq!(analysis.complexity, Complexity::Low);
        assert_eq!(
            analysis.entities,
            Entities {
                regions: vec!["europe".to_string()],
                ..Entities::default()
            }
        );
        assert!(analysis.suggestions.is_empty());
        assert_eq!(analysis.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn geographic_wins_over_population() {
        assert_eq!(
            classify("population of countries in Europe").intent,
            Intent::Geographic
        );
        assert_eq!(classify("Most populated countries").intent, Intent::Population);
    }

    #[test]
    fn priority_follows_table_order() {
        // "speak" (language) and "flag" both match; language is scanned first.
        assert_eq!(classify("Do they speak about the flag").intent, Intent::Language);
        // "star" (flag) and "border" both match.
        assert_eq!(classify("Stars near the border").intent, Intent::Flag);
        assert_eq!(classify("Which countries use the euro").intent, Intent::Currency);
        assert_eq!(classify("Smallest countries").intent, Intent::Size);
        assert_eq!(classify("Countries adjacent to Chad").intent, Intent::Border);
        assert_eq!(classify("Tell me something").intent, Intent::General);
    }

    #[test]
    fn complexity_scoring() {
        // compare/vs contribute 2 together, nothing else applies
        assert_eq!(classify("Compare France vs Germany").complexity, Complexity::Medium);
        // and (+1), digit (+1)
        assert_eq!(
            classify("Countries in Asia and over 100 people").complexity,
            Complexity::Medium
        );
        // and (+1), except (+1), compare (+2), digit (+1)
        assert_eq!(
            classify("Compare Spain and Italy except 2 regions").complexity,
            Complexity::High
        );
        // more than 10 words alone
        assert_eq!(
            classify("which of the big old nations is the one i may visit first").complexity,
            Complexity::Low
        );
    }

    #[test]
    fn high_complexity_adds_hint() {
        let analysis =
            classify("Compare population of France and Germany with over 50 million people");
        assert_eq!(analysis.complexity, Complexity::High);
        assert_eq!(
            analysis.suggestions.last().map(String::as_str),
            Some("This is a complex query. Consider breaking it into simpler parts.")
        );
    }

    #[test]
    fn intent_specific_suggestions() {
        assert_eq!(
            classify("Countries located in the north").suggestions,
            vec!["Consider specifying a region like 'Europe' or 'Asia'"]
        );
        assert_eq!(
            classify("Most populous nations").suggestions,
            vec!["You can specify population thresholds like 'over 100 million'"]
        );
        assert_eq!(
            classify("Which language is official").suggestions,
            vec!["Try specifying a language like 'Spanish' or 'French'"]
        );
        assert!(classify("Spanish speaking countries").suggestions.is_empty());
    }

    #[test]
    fn extracts_every_entity_kind() {
        let entities = classify(
            "Red flags in South America with more than 20 or 300 people, French, France",
        )
        .entities;
        assert_eq!(entities.regions, vec!["south america"]);
        assert_eq!(entities.languages, vec!["french"]);
        assert_eq!(entities.countries, vec!["france"]);
        assert_eq!(entities.colors, vec!["red"]);
        assert_eq!(entities.numbers, vec![20, 300]);
        assert_eq!(entities.comparisons, vec!["more than"]);
    }

    #[test]
    fn empty_query_is_general() {
        let analysis = classify("");
        assert_eq!(analysis.intent, Intent::General);
        assert_eq!(analysis.complexity, Complexity::Low);
        assert_eq!(analysis.entities, Entities::default());
        assert!(analysis.suggestions.is_empty());
    }

    #[test]
    fn classification_is_deterministic() {
        let analyzer = QueryAnalyzer::default();
        for query in ["Countries in Europe", "compare 3 vs 4 but not 5", "", "ÉTATS-UNIS"] {
            assert_eq!(analyzer.classify(query), analyzer.classify(query));
        }
    }

    #[test]
    fn oversized_numbers_are_skipped() {
        let entities = classify("over 99999999999999999999999 or 7").entities;
        assert_eq!(entities.numbers, vec![7]);
    }

    #[test]
    fn only_ascii_digits_form_numbers() {
        let entities = classify("more than 12\u{0663} people").entities;
        assert_eq!(entities.numbers, vec![12]);
    }
}
