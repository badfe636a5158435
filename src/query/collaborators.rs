//! Seams between the query engine and the outside world: SQL execution, map
//! highlighting and message presentation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

/// One result row. Only `name` and `ISO_A3` are interpreted; other selected
/// columns ride along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRow {
    pub name: String,
    #[serde(rename = "ISO_A3")]
    pub iso_a3: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CountryRow {
    /// Builds a row from column/value pairs. Column names are matched
    /// case-insensitively; a missing name falls back to the ISO code.
    pub fn from_columns(mut columns: Map<String, Value>) -> Result<Self, ExecutionError> {
        let iso_a3 =
            take_text(&mut columns, "ISO_A3").ok_or(ExecutionError::MissingColumn("ISO_A3"))?;
        let name = take_text(&mut columns, "name").unwrap_or_else(|| iso_a3.clone());

        Ok(Self {
            name,
            iso_a3,
            extra: columns,
        })
    }
}

fn take_text(columns: &mut Map<String, Value>, wanted: &str) -> Option<String> {
    let key = columns.keys().find(|k| k.eq_ignore_ascii_case(wanted))?.clone();
    match columns.remove(&key)? {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    Sql(String),
    MissingColumn(&'static str),
    Internal(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Sql(msg) => write!(f, "{}", msg),
            ExecutionError::MissingColumn(column) => {
                write!(f, "Result is missing the {} column", column)
            }
            ExecutionError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for ExecutionError {}

/// What the prompt needs to know about the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSchema {
    pub table: String,
    pub fields: Vec<String>,
    pub sample_row: Value,
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<CountryRow>, ExecutionError>;
    fn schema(&self) -> &DatasetSchema;
}

/// Minimal view of a map feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFeature {
    #[serde(rename = "ISO_A3")]
    pub iso_a3: String,
    pub name: Option<String>,
}

/// Feature filter closed over the ISO codes of one result set. Cheap to clone,
/// so a cached entry can re-apply it later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightPredicate {
    codes: Arc<BTreeSet<String>>,
}

impl HighlightPredicate {
    pub fn from_rows(rows: &[CountryRow]) -> Self {
        Self {
            codes: Arc::new(rows.iter().map(|row| row.iso_a3.clone()).collect()),
        }
    }

    pub fn matches(&self, feature: &MapFeature) -> bool {
        self.codes.contains(&feature.iso_a3)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

pub trait MapHighlighter: Send + Sync {
    /// Highlights matching features and returns how many matched.
    fn highlight(&self, predicate: &HighlightPredicate) -> usize;
}

pub trait MessagePresenter: Send + Sync {
    fn present(&self, message: &str);
}

/// In-process feature layer: the known country features plus the set
/// currently highlighted.
#[derive(Debug, Default)]
pub struct FeatureLayer {
    features: Vec<MapFeature>,
    highlighted: Mutex<Vec<String>>,
}

impl FeatureLayer {
    pub fn new(features: Vec<MapFeature>) -> Self {
        Self {
            features,
            highlighted: Mutex::new(Vec::new()),
        }
    }

    pub fn features(&self) -> &[MapFeature] {
        &self.features
    }

    pub fn highlighted(&self) -> Vec<String> {
        self.highlighted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MapHighlighter for FeatureLayer {
    fn highlight(&self, predicate: &HighlightPredicate) -> usize {
        let matched: Vec<String> = self
            .features
            .iter()
            .filter(|feature| predicate.matches(feature))
            .map(|feature| feature.iso_a3.clone())
            .collect();
        let count = matched.len();
        *self.highlighted.lock().unwrap_or_else(|e| e.into_inner()) = matched;
        count
    }
}

/// Keeps every presented message, newest last.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: Mutex<Vec<String>>,
}

impl MessageBuffer {
    pub fn last(&self) -> Option<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessagePresenter for MessageBuffer {
    fn present(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
