use crate::config::DatasetConfig;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::query::collaborators::{
    CountryRow, DatasetSchema, ExecutionError, MapFeature, SqlExecutor,
};
use async_trait::async_trait;
use duckdb::Connection;
use duckdb::types::Value as DbValue;
use r2d2::Pool;
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub enum DatasetError {
    NotFound(PathBuf),
    UnsupportedFormat(String),
    InvalidTableName(String),
    MissingColumn(&'static str),
    Database(String),
    Pool(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::NotFound(path) => write!(f, "Dataset not found: {}", path.display()),
            DatasetError::UnsupportedFormat(ext) => {
                write!(f, "Unsupported dataset format: {}", ext)
            }
            DatasetError::InvalidTableName(name) => write!(f, "Invalid table name: {}", name),
            DatasetError::MissingColumn(column) => {
                write!(f, "Dataset has no {} column", column)
            }
            DatasetError::Database(msg) => write!(f, "Database error: {}", msg),
            DatasetError::Pool(msg) => write!(f, "Connection pool error: {}", msg),
        }
    }
}

impl Error for DatasetError {}

impl From<duckdb::Error> for DatasetError {
    fn from(err: duckdb::Error) -> Self {
        DatasetError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for DatasetError {
    fn from(err: r2d2::Error) -> Self {
        DatasetError::Pool(err.to_string())
    }
}

/// The country table, loaded once into an in-memory DuckDB database.
pub struct CountryDataset {
    pool: Pool<DuckDBConnectionManager>,
    schema: DatasetSchema,
    features: Vec<MapFeature>,
}

impl CountryDataset {
    pub fn load(config: &DatasetConfig) -> Result<Self, DatasetError> {
        let table = &config.table;
        if !is_identifier(table) {
            return Err(DatasetError::InvalidTableName(table.clone()));
        }
        if !config.path.exists() {
            return Err(DatasetError::NotFound(config.path.clone()));
        }

        let source = source_for(&config.path)?;

        info!("Loading {} into table {}", config.path.display(), table);
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&format!("CREATE TABLE {} AS SELECT * FROM {}", table, source))?;

        let fields = table_fields(&conn, table)?;
        if !fields.iter().any(|f| f.eq_ignore_ascii_case("ISO_A3")) {
            return Err(DatasetError::MissingColumn("ISO_A3"));
        }

        let sample_row = query_rows(&conn, &format!("SELECT * FROM {} LIMIT 1", table))?
            .into_iter()
            .next()
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(Map::new()));

        let features: Vec<MapFeature> = query_rows(&conn, &format!("SELECT * FROM {}", table))?
            .into_iter()
            .filter_map(|columns| CountryRow::from_columns(columns).ok())
            .map(|row| MapFeature {
                iso_a3: row.iso_a3,
                name: Some(row.name),
            })
            .collect();

        info!("Loaded {} countries with fields: {}", features.len(), fields.join(", "));

        // Generated SQL only ever sees the loaded table
        conn.execute_batch("SET enable_external_access = false; SET lock_configuration = true;")?;

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1) as u32)
            .build(DuckDBConnectionManager::new(conn))?;

        Ok(Self {
            pool,
            schema: DatasetSchema {
                table: table.clone(),
                fields,
                sample_row,
            },
            features,
        })
    }

    /// One feature per country, for the map layer.
    pub fn features(&self) -> &[MapFeature] {
        &self.features
    }

    pub fn country_count(&self) -> usize {
        self.features.len()
    }
}

#[async_trait]
impl SqlExecutor for CountryDataset {
    async fn execute(&self, sql: &str) -> Result<Vec<CountryRow>, ExecutionError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<CountryRow>, ExecutionError> {
            let conn = pool
                .get()
                .map_err(|e| ExecutionError::Internal(e.to_string()))?;
            debug!("Executing SQL: {}", sql);

            query_rows(&conn, &sql)
                .map_err(|e| ExecutionError::Sql(e.to_string()))?
                .into_iter()
                .map(CountryRow::from_columns)
                .collect()
        })
        .await
        .map_err(|e| ExecutionError::Internal(e.to_string()))?
    }

    fn schema(&self) -> &DatasetSchema {
        &self.schema
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table function call reading the file, picked by extension.
fn source_for(path: &Path) -> Result<String, DatasetError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let quoted = path.to_string_lossy().replace('\'', "''");
    match ext.as_str() {
        "csv" | "tsv" => Ok(format!("read_csv_auto('{}', header = true)", quoted)),
        "json" | "jsonl" | "ndjson" => Ok(format!("read_json_auto('{}')", quoted)),
        _ => Err(DatasetError::UnsupportedFormat(ext)),
    }
}

fn table_fields(conn: &Connection, table: &str) -> Result<Vec<String>, duckdb::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

/// Runs `sql` and returns each row as column name to JSON value.
fn query_rows(conn: &Connection, sql: &str) -> Result<Vec<Map<String, Value>>, duckdb::Error> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let names: Vec<String> = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Map::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let value: DbValue = row.get(i)?;
            columns.insert(name.clone(), to_json(value));
        }
        out.push(columns);
    }
    Ok(out)
}

fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(n) => Value::from(n),
        DbValue::SmallInt(n) => Value::from(n),
        DbValue::Int(n) => Value::from(n),
        DbValue::BigInt(n) => Value::from(n),
        DbValue::HugeInt(n) => i64::try_from(n)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(n.to_string())),
        DbValue::UTinyInt(n) => Value::from(n),
        DbValue::USmallInt(n) => Value::from(n),
        DbValue::UInt(n) => Value::from(n),
        DbValue::UBigInt(n) => Value::from(n),
        DbValue::Float(n) => float(f64::from(n)),
        DbValue::Double(n) => float(n),
        DbValue::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>().map(float).unwrap_or(Value::String(text))
        }
        DbValue::Text(s) => Value::String(s),
        DbValue::Enum(s) => Value::String(s),
        DbValue::List(items) => Value::Array(items.into_iter().map(to_json).collect()),
        other => Value::String(format!("{:?}", other)),
    }
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
