//! Data tools the model can call for multi-part questions. Each call is
//! turned into a parameterless `SELECT` over the country table; column names
//! are checked against the loaded schema and text values are quoted.

use super::collaborators::{CountryRow, DatasetSchema, SqlExecutor};
use crate::analysis::{Complexity, Intent, QueryAnalysis};
use crate::llm::models::{ChatMessage, CompletionRequest, ToolCall};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use tracing::debug;

pub const SEARCH_COUNTRIES: &str = "search_countries";
pub const GET_COUNTRY_DETAILS: &str = "get_country_details";
pub const COMPARE_COUNTRIES: &str = "compare_countries";
pub const GET_STATISTICS: &str = "get_statistics";

const TOOL_MAX_TOKENS: u32 = 500;
const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 250;
const DEFAULT_DETAIL_FIELDS: [&str; 5] = ["name", "ISO_A3", "region", "population", "area"];

const SYSTEM_PROMPT: &str = "You are a country data expert assistant. You can use various tools to help answer questions about world countries.

Available tools:
- search_countries: Find countries based on criteria
- get_country_details: Get detailed information about specific countries
- compare_countries: Compare multiple countries
- get_statistics: Get statistical information

Use tools when appropriate to provide comprehensive answers. For simple queries, you can respond directly.";

/// Medium and high complexity questions, and anything classified as
/// complex, are worth a tool round trip.
pub fn wants_tools(analysis: &QueryAnalysis) -> bool {
    matches!(analysis.complexity, Complexity::Medium | Complexity::High)
        || analysis.intent == Intent::Complex
}

/// System and user messages plus the tool definitions.
pub fn tool_request(query: &str, temperature: f32) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)],
        temperature,
        max_tokens: TOOL_MAX_TOKENS,
        response_format: None,
        tools: tool_definitions(),
    }
}

pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_COUNTRIES,
                "description": "Search for countries based on specific criteria",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "region": {
                            "type": "string",
                            "description": "Geographic region (Europe, Asia, Africa, Americas, Oceania)",
                            "enum": ["Europe", "Asia", "Africa", "Americas", "Oceania"]
                        },
                        "min_population": {"type": "number", "description": "Minimum population threshold"},
                        "max_population": {"type": "number", "description": "Maximum population threshold"},
                        "language": {"type": "string", "description": "Language spoken in the country"},
                        "flag_color": {"type": "string", "description": "Color present in the country's flag"},
                        "currency": {"type": "string", "description": "Currency used in the country"}
                    },
                    "required": []
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": GET_COUNTRY_DETAILS,
                "description": "Get detailed information about specific countries",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "country_names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "List of country names to get details for"
                        },
                        "fields": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Specific fields to retrieve (name, population, area, region, etc.)"
                        }
                    },
                    "required": ["country_names"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": COMPARE_COUNTRIES,
                "description": "Compare two or more countries across different metrics",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "country_names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "List of countries to compare (2-5 countries)"
                        },
                        "metrics": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Metrics to compare (population, area, region, languages, etc.)"
                        }
                    },
                    "required": ["country_names", "metrics"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": GET_STATISTICS,
                "description": "Get statistical information about countries",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "statistic_type": {
                            "type": "string",
                            "description": "Type of statistic to calculate",
                            "enum": ["largest", "smallest", "most_populated", "least_populated", "count_by_region"]
                        },
                        "field": {"type": "string", "description": "Field to calculate statistics for (population, area)"},
                        "limit": {"type": "number", "description": "Number of results to return (default 10)", "default": 10},
                        "region": {"type": "string", "description": "Filter by specific region (optional)"}
                    },
                    "required": ["statistic_type"]
                }
            }
        }),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    UnknownTool(String),
    InvalidArguments(String),
    UnknownField(String),
    Execution(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::UnknownTool(name) => write!(f, "Unknown function: {}", name),
            ToolError::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            ToolError::UnknownField(field) => write!(f, "Unknown field: {}", field),
            ToolError::Execution(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for ToolError {}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    pub region: Option<String>,
    pub min_population: Option<f64>,
    pub max_population: Option<f64>,
    pub language: Option<String>,
    pub flag_color: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetailsRequest {
    pub country_names: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompareRequest {
    pub country_names: Vec<String>,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    Largest,
    Smallest,
    MostPopulated,
    LeastPopulated,
    CountByRegion,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatisticsRequest {
    pub statistic_type: StatisticKind,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CountryTool {
    Search(SearchCriteria),
    Details(DetailsRequest),
    Compare(CompareRequest),
    Statistics(StatisticsRequest),
}

fn arguments<T: DeserializeOwned>(value: &Value) -> Result<T, ToolError> {
    let value = match value {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

impl CountryTool {
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            SEARCH_COUNTRIES => Ok(CountryTool::Search(arguments(&call.arguments)?)),
            GET_COUNTRY_DETAILS => Ok(CountryTool::Details(arguments(&call.arguments)?)),
            COMPARE_COUNTRIES => Ok(CountryTool::Compare(arguments(&call.arguments)?)),
            GET_STATISTICS => Ok(CountryTool::Statistics(arguments(&call.arguments)?)),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CountryTool::Search(_) => SEARCH_COUNTRIES,
            CountryTool::Details(_) => GET_COUNTRY_DETAILS,
            CountryTool::Compare(_) => COMPARE_COUNTRIES,
            CountryTool::Statistics(_) => GET_STATISTICS,
        }
    }

    /// The statement this call runs.
    pub fn to_sql(&self, schema: &DatasetSchema) -> Result<String, ToolError> {
        let table = Table { schema };
        match self {
            CountryTool::Search(criteria) => search_sql(&table, criteria),
            CountryTool::Details(request) => details_sql(&table, request),
            CountryTool::Compare(request) => compare_sql(&table, request),
            CountryTool::Statistics(request) => statistics_sql(&table, request),
        }
    }

    pub async fn run(&self, executor: &dyn SqlExecutor) -> Result<ToolOutput, ToolError> {
        let schema = executor.schema();
        let sql = self.to_sql(schema)?;
        debug!("Tool {} SQL: {}", self.name(), sql);

        let countries = executor
            .execute(&sql)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(match self {
            CountryTool::Search(_) => ToolOutput::Search { countries, sql },
            CountryTool::Details(_) => ToolOutput::Details { countries, sql },
            CountryTool::Compare(request) => {
                let table = Table { schema };
                let metrics = request
                    .metrics
                    .iter()
                    .map(|m| table.field(m).map(str::to_string))
                    .collect::<Result<Vec<_>, _>>()?;
                let summary = summarize(&countries, &metrics);
                ToolOutput::Comparison {
                    countries,
                    metrics,
                    summary,
                    sql,
                }
            }
            CountryTool::Statistics(request) => match request.statistic_type {
                StatisticKind::CountByRegion => ToolOutput::RegionCounts {
                    counts: count_by_region(&countries),
                    sql,
                },
                statistic => ToolOutput::Ranking {
                    statistic,
                    field: Table { schema }.field(ranked_field(request))?.to_string(),
                    countries,
                    sql,
                },
            },
        })
    }
}

/// Resolves requested column names against the schema.
struct Table<'a> {
    schema: &'a DatasetSchema,
}

impl<'a> Table<'a> {
    fn field(&self, wanted: &str) -> Result<&'a str, ToolError> {
        self.schema
            .fields
            .iter()
            .find(|f| f.eq_ignore_ascii_case(wanted.trim()))
            .map(String::as_str)
            .ok_or_else(|| ToolError::UnknownField(wanted.to_string()))
    }

    fn column(&self, wanted: &str) -> Result<String, ToolError> {
        self.field(wanted).map(quote_ident)
    }

    fn has(&self, wanted: &str) -> bool {
        self.field(wanted).is_ok()
    }

    /// `name` and `ISO_A3` first, then `extra` in order, without repeats.
    fn select_list(&self, extra: &[&str]) -> Result<String, ToolError> {
        let mut fields: Vec<&str> = vec![self.field("name")?, self.field("ISO_A3")?];
        for wanted in extra {
            let field = self.field(wanted)?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields.into_iter().map(quote_ident).collect::<Vec<_>>().join(", "))
    }

    fn name(&self) -> &str {
        &self.schema.table
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn contains(text: &str) -> String {
    quote_text(&format!("%{}%", text))
}

fn number(n: f64) -> Result<String, ToolError> {
    if n.is_finite() {
        Ok(n.to_string())
    } else {
        Err(ToolError::InvalidArguments(format!("{} is not a number", n)))
    }
}

fn where_clause(conditions: &[String], joiner: &str) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(joiner))
    }
}

fn name_matches(table: &Table, names: &[String]) -> Result<String, ToolError> {
    let name = table.column("name")?;
    Ok(names
        .iter()
        .map(|n| format!("{} ILIKE {}", name, contains(n.trim())))
        .collect::<Vec<_>>()
        .join(" OR "))
}

fn search_sql(table: &Table, criteria: &SearchCriteria) -> Result<String, ToolError> {
    let mut conditions = Vec::new();
    if let Some(region) = &criteria.region {
        conditions.push(format!("{} = {}", table.column("region")?, quote_text(region)));
    }
    if let Some(min) = criteria.min_population {
        conditions.push(format!("{} >= {}", table.column("population")?, number(min)?));
    }
    if let Some(max) = criteria.max_population {
        conditions.push(format!("{} <= {}", table.column("population")?, number(max)?));
    }
    if let Some(language) = &criteria.language {
        conditions.push(format!("{} ILIKE {}", table.column("languages")?, contains(language)));
    }
    if let Some(color) = &criteria.flag_color {
        conditions.push(format!(
            "{} ILIKE {}",
            table.column("flagDescription")?,
            contains(color)
        ));
    }
    if let Some(currency) = &criteria.currency {
        conditions.push(format!("{} ILIKE {}", table.column("currencies")?, contains(currency)));
    }

    let shown: Vec<&str> = ["region", "population"]
        .into_iter()
        .filter(|f| table.has(f))
        .collect();

    Ok(format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        table.select_list(&shown)?,
        table.name(),
        where_clause(&conditions, " AND "),
        table.column("name")?
    ))
}

fn details_sql(table: &Table, request: &DetailsRequest) -> Result<String, ToolError> {
    if request.country_names.is_empty() {
        return Err(ToolError::InvalidArguments(
            "At least one country name is required".to_string(),
        ));
    }

    let requested: Vec<&str> = if request.fields.is_empty() {
        DEFAULT_DETAIL_FIELDS
            .into_iter()
            .filter(|f| table.has(f))
            .collect()
    } else {
        request.fields.iter().map(String::as_str).collect()
    };

    Ok(format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        table.select_list(&requested)?,
        table.name(),
        name_matches(table, &request.country_names)?,
        table.column("name")?
    ))
}

fn compare_sql(table: &Table, request: &CompareRequest) -> Result<String, ToolError> {
    if request.country_names.len() < 2 {
        return Err(ToolError::InvalidArguments(
            "At least 2 countries required for comparison".to_string(),
        ));
    }
    if request.country_names.len() > 5 {
        return Err(ToolError::InvalidArguments(
            "Maximum 5 countries allowed for comparison".to_string(),
        ));
    }

    let metrics: Vec<&str> = request.metrics.iter().map(String::as_str).collect();
    Ok(format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        table.select_list(&metrics)?,
        table.name(),
        name_matches(table, &request.country_names)?,
        table.column("name")?
    ))
}

fn ranked_field(request: &StatisticsRequest) -> &str {
    match request.statistic_type {
        StatisticKind::MostPopulated | StatisticKind::LeastPopulated => "population",
        _ => request.field.as_deref().unwrap_or("population"),
    }
}

fn statistics_sql(table: &Table, request: &StatisticsRequest) -> Result<String, ToolError> {
    let region_filter = match &request.region {
        Some(region) => vec![format!("{} = {}", table.column("region")?, quote_text(region))],
        None => Vec::new(),
    };

    let order = match request.statistic_type {
        StatisticKind::Largest | StatisticKind::MostPopulated => "DESC",
        StatisticKind::Smallest | StatisticKind::LeastPopulated => "ASC",
        StatisticKind::CountByRegion => {
            // Counted after the fact so every row still carries its ISO code
            return Ok(format!(
                "SELECT {} FROM {}{}",
                table.select_list(&["region"])?,
                table.name(),
                where_clause(&region_filter, " AND ")
            ));
        }
    };

    let field = ranked_field(request);
    let limit = request
        .limit
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| (n as usize).min(MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);

    Ok(format!(
        "SELECT {} FROM {}{} ORDER BY {} {} NULLS LAST LIMIT {}",
        table.select_list(&[field])?,
        table.name(),
        where_clause(&region_filter, " AND "),
        table.column(field)?,
        order,
        limit
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub highest: f64,
    pub lowest: f64,
    pub average: f64,
}

/// Highest, lowest and mean of the numeric population and area metrics.
fn summarize(countries: &[CountryRow], metrics: &[String]) -> BTreeMap<String, MetricSummary> {
    metrics
        .iter()
        .filter(|m| m.eq_ignore_ascii_case("population") || m.eq_ignore_ascii_case("area"))
        .filter_map(|metric| {
            let values: Vec<f64> = countries
                .iter()
                .filter_map(|c| c.extra.get(metric).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                return None;
            }
            let summary = MetricSummary {
                highest: values.iter().copied().fold(f64::MIN, f64::max),
                lowest: values.iter().copied().fold(f64::MAX, f64::min),
                average: values.iter().sum::<f64>() / values.len() as f64,
            };
            Some((metric.clone(), summary))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCount {
    pub region: String,
    pub count: usize,
}

/// Largest groups first; ties by region name.
fn count_by_region(countries: &[CountryRow]) -> Vec<RegionCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for country in countries {
        let region = country
            .extra
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("region"))
            .and_then(|(_, v)| v.as_str())
            .unwrap_or("Unknown");
        *counts.entry(region.to_string()).or_default() += 1;
    }

    let mut counts: Vec<RegionCount> = counts
        .into_iter()
        .map(|(region, count)| RegionCount { region, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.region.cmp(&b.region)));
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    Search {
        countries: Vec<CountryRow>,
        sql: String,
    },
    Details {
        countries: Vec<CountryRow>,
        sql: String,
    },
    Comparison {
        countries: Vec<CountryRow>,
        metrics: Vec<String>,
        summary: BTreeMap<String, MetricSummary>,
        sql: String,
    },
    Ranking {
        statistic: StatisticKind,
        field: String,
        countries: Vec<CountryRow>,
        sql: String,
    },
    RegionCounts {
        counts: Vec<RegionCount>,
        sql: String,
    },
}

impl ToolOutput {
    /// Countries to highlight. Region counts name none.
    pub fn countries(&self) -> &[CountryRow] {
        match self {
            ToolOutput::Search { countries, .. }
            | ToolOutput::Details { countries, .. }
            | ToolOutput::Comparison { countries, .. }
            | ToolOutput::Ranking { countries, .. } => countries,
            ToolOutput::RegionCounts { .. } => &[],
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            ToolOutput::Search { sql, .. }
            | ToolOutput::Details { sql, .. }
            | ToolOutput::Comparison { sql, .. }
            | ToolOutput::Ranking { sql, .. }
            | ToolOutput::RegionCounts { sql, .. } => sql,
        }
    }
}

/// One tool call as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolReport {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolReport {
    pub async fn run(call: &ToolCall, executor: &dyn SqlExecutor) -> Self {
        let outcome = match CountryTool::from_call(call) {
            Ok(tool) => tool.run(executor).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => ToolReport {
                tool: call.name.clone(),
                output: Some(output),
                error: None,
            },
            Err(e) => ToolReport {
                tool: call.name.clone(),
                output: None,
                error: Some(e.to_string()),
            },
        }
    }
}
