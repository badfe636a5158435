use crate::llm::LlmError;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Input rejected before any work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    EmptyQuery,
    EngineNotInitialized,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyQuery => write!(f, "Please enter a question about countries."),
            ValidationError::EngineNotInitialized => write!(
                f,
                "The language model is not initialized. Please initialize it first."
            ),
        }
    }
}

/// Every failure `resolve` can end in.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    Validation(ValidationError),
    SqlGeneration {
        detail: String,
        raw_response: String,
    },
    QueryExecution {
        detail: String,
        sql_query: String,
    },
    Unexpected {
        detail: String,
        sql_query: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    SqlGeneration,
    QueryExecution,
    Unexpected,
}

impl QueryError {
    pub fn sql_generation(detail: impl Into<String>, raw_response: impl Into<String>) -> Self {
        QueryError::SqlGeneration {
            detail: detail.into(),
            raw_response: raw_response.into(),
        }
    }

    pub fn query_execution(detail: impl Into<String>, sql_query: impl Into<String>) -> Self {
        QueryError::QueryExecution {
            detail: detail.into(),
            sql_query: sql_query.into(),
        }
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        QueryError::Unexpected {
            detail: detail.into(),
            sql_query: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Validation(_) => ErrorKind::Validation,
            QueryError::SqlGeneration { .. } => ErrorKind::SqlGeneration,
            QueryError::QueryExecution { .. } => ErrorKind::QueryExecution,
            QueryError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// The model text a generation failure was derived from.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            QueryError::SqlGeneration { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    pub fn sql_query(&self) -> Option<&str> {
        match self {
            QueryError::QueryExecution { sql_query, .. } => Some(sql_query),
            QueryError::Unexpected { sql_query, .. } => sql_query.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Validation(err) => write!(f, "{}", err),
            QueryError::SqlGeneration { detail, .. } => {
                write!(f, "Failed to generate SQL query: {}", detail)
            }
            QueryError::QueryExecution { detail, .. } => {
                write!(f, "Error executing query: {}", detail)
            }
            QueryError::Unexpected { detail, .. } => write!(f, "{}", detail),
        }
    }
}

impl Error for QueryError {}

impl From<ValidationError> for QueryError {
    fn from(err: ValidationError) -> Self {
        QueryError::Validation(err)
    }
}

impl From<LlmError> for QueryError {
    fn from(err: LlmError) -> Self {
        QueryError::unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_by_kind() {
        let err = QueryError::sql_generation("I cannot help", "I cannot help");
        assert_eq!(err.to_string(), "Failed to generate SQL query: I cannot help");

        let err =
            QueryError::query_execution("no such column: colour", "SELECT colour FROM countries");
        assert_eq!(err.to_string(), "Error executing query: no such column: colour");
        assert_eq!(err.sql_query(), Some("SELECT colour FROM countries"));
        assert_eq!(err.kind(), ErrorKind::QueryExecution);

        let err: QueryError = ValidationError::EmptyQuery.into();
        assert_eq!(err.to_string(), "Please enter a question about countries.");
        assert_eq!(err.raw_response(), None);
    }

    #[test]
    fn llm_failures_are_unexpected() {
        let err: QueryError = LlmError::Timeout(std::time::Duration::from_secs(30)).into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.sql_query(), None);
        assert!(err.to_string().contains("timed out"));
    }
}
