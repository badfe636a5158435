//! Defensive extraction of a single SELECT statement from model output.
//!
//! Every step before the final check is infallible; malformed output ends in
//! one [`QueryError::SqlGeneration`] carrying the raw text.

use crate::llm::models::StructuredSqlResponse;
use crate::query::error::QueryError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static LEADING_BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(here's the sql query you need:|sql query:|query:)\s*").expect("valid regex")
});

static TRAILING_EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(this will find.*|this query.*|the above query.*)$").expect("valid regex")
});

/// Clause keywords that may open a continuation line of a multi-line statement.
const CONTINUATION_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "AND", "OR", "NOT", "ORDER", "GROUP", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "ON", "UNION", "EXCEPT", "INTERSECT", "CASE",
    "WHEN", "THEN", "ELSE", "END", "AS", "ASC", "DESC", "IN", "LIKE", "BETWEEN", "IS",
];

pub fn starts_with_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

/// Extracts bare SQL from a free-text completion.
pub fn parse_sql(raw: &str) -> Result<String, QueryError> {
    let raw = raw.trim();
    let body = unfence(raw).unwrap_or(raw);

    let mut sql = select_run(body).unwrap_or(body).to_string();
    sql = LEADING_BOILERPLATE.replace(&sql, "").into_owned();
    sql = TRAILING_EXPLANATION.replace(&sql, "").into_owned();
    let sql = sql.trim();

    if !starts_with_select(sql) {
        return Err(QueryError::sql_generation(raw, raw));
    }

    debug!("Extracted SQL: {}", sql);
    Ok(sql.to_string())
}

/// Decodes a JSON-mode completion and checks its `sql` field.
pub fn parse_structured(raw: &str) -> Result<StructuredSqlResponse, QueryError> {
    let raw = raw.trim();
    let body = unfence(raw).unwrap_or(raw);

    let value: Value = serde_json::from_str(body).map_err(|e| {
        QueryError::sql_generation(format!("Invalid structured response: {}", e), raw)
    })?;

    let mut response = StructuredSqlResponse::from_value(&value).ok_or_else(|| {
        QueryError::sql_generation("Invalid structured response: missing or invalid SQL", raw)
    })?;

    response.sql = response.sql.trim().to_string();
    if !starts_with_select(&response.sql) {
        return Err(QueryError::sql_generation(
            format!("Generated SQL does not start with SELECT: {}", response.sql),
            raw,
        ));
    }

    debug!("Extracted structured SQL: {}", response.sql);
    Ok(response)
}

/// Contents of the first fenced code block, with an optional language tag.
fn unfence(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let after = &content[start + 3..];
    let end = after.find("```")?;
    let block = &after[..end];

    let block = match block.find('\n') {
        Some(newline)
            if !block[..newline].trim().contains(' ') && !starts_with_select(&block[..newline]) =>
        {
            &block[newline + 1..]
        }
        _ => block,
    };
    Some(block.trim())
}

/// The first `SELECT` run: up to a blank line, or a new line that starts with a
/// capital letter and is not a SQL clause.
fn select_run(content: &str) -> Option<&str> {
    let start = content.to_ascii_lowercase().find("select")?;
    let tail = &content[start..];

    let mut end = tail.len();
    let mut offset = 0;
    for line in tail.split_inclusive('\n') {
        if offset > 0 && ends_statement(line) {
            end = offset - 1;
            break;
        }
        offset += line.len();
    }
    Some(&tail[..end])
}

fn ends_statement(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return true;
    }
    if !line.starts_with(|c: char| c.is_ascii_uppercase()) {
        return false;
    }
    let word: String = line
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    !CONTINUATION_KEYWORDS.contains(&word.as_str())
}
