use super::{Intent, QueryAnalysis};
use serde::Serialize;

/// Post-execution sanity check of a result against the question's intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

const LARGE_RESULT: usize = 50;

pub fn validate_result(analysis: &QueryAnalysis, sql: &str, row_count: usize) -> ResultValidation {
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    if analysis.intent == Intent::Geographic && row_count == 0 {
        issues.push("No countries found for geographic query".to_string());
        suggestions.push("Try a broader region or check spelling".to_string());
    }

    if analysis.intent == Intent::Population && row_count > LARGE_RESULT {
        suggestions.push("Large result set - consider adding population filters".to_string());
    }

    if !sql.to_lowercase().contains("order by") {
        suggestions.push("Results might be more readable with sorting".to_string());
    }

    ResultValidation {
        is_valid: issues.is_empty(),
        issues,
        suggestions,
    }
}
