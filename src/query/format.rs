use super::collaborators::CountryRow;
use super::error::QueryError;
use super::tools::ToolReport;
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, context};
use serde::Serialize;
use std::time::Duration;
use tracing::error;

const RESULT_TEMPLATE: &str = "result.html";
const ERROR_TEMPLATE: &str = "error.html";
const TOOLS_TEMPLATE: &str = "tools.html";

/// How long generation and execution took for one resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub generation: Duration,
    pub execution: Duration,
}

/// How long the model and the tool calls took for one tool round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToolTimings {
    pub completion: Duration,
    pub tools: Duration,
}

#[derive(Serialize)]
struct CountryLink<'a> {
    name: &'a str,
    iso_a3: &'a str,
}

pub fn highlight_status(count: usize) -> String {
    match count {
        0 => "No countries highlighted.".to_string(),
        1 => "1 country highlighted.".to_string(),
        n => format!("{} countries highlighted.", n),
    }
}

/// Renders result and error messages as HTML fragments. Interpolated values
/// are escaped by the template environment.
pub struct MessageFormatter {
    env: Environment<'static>,
    display_limit: usize,
}

impl MessageFormatter {
    pub fn new(display_limit: usize) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(RESULT_TEMPLATE, include_str!("../../templates/result.html"))?;
        env.add_template(ERROR_TEMPLATE, include_str!("../../templates/error.html"))?;
        env.add_template(TOOLS_TEMPLATE, include_str!("../../templates/tools.html"))?;
        env.add_filter("number", number);

        Ok(Self {
            env,
            display_limit: display_limit.max(1),
        })
    }

    /// `rows` are expected in display order.
    pub fn render_result(
        &self,
        rows: &[CountryRow],
        sql: &str,
        elapsed: Duration,
        timings: &StageTimings,
        highlighted: usize,
    ) -> String {
        let links: Vec<CountryLink> = rows
            .iter()
            .map(|row| CountryLink {
                name: &row.name,
                iso_a3: &row.iso_a3,
            })
            .collect();
        let shown = &links[..links.len().min(self.display_limit)];
        let count = rows.len();

        let ctx = context! {
            count => count,
            noun => if count == 1 { "country" } else { "countries" },
            total_ms => format!("{:.0}", millis(elapsed)),
            shown => shown,
            all => &links,
            remaining => count.saturating_sub(self.display_limit),
            sql => sql,
            gen_ms => format!("{:.1}", millis(timings.generation)),
            exec_ms => format!("{:.1}", millis(timings.execution)),
            highlight_status => highlight_status(highlighted),
        };

        self.render(RESULT_TEMPLATE, ctx).unwrap_or_else(|| {
            format!(
                "{} {} found. {}",
                count,
                if count == 1 { "country" } else { "countries" },
                highlight_status(highlighted)
            )
        })
    }

    /// Tool results, or the model's own answer when it called no tools.
    /// `highlighted` is `None` when no tool named any countries.
    pub fn render_tools(
        &self,
        reports: &[ToolReport],
        content: &str,
        elapsed: Duration,
        timings: &ToolTimings,
        highlighted: Option<usize>,
    ) -> String {
        let ctx = context! {
            reports => reports,
            content => content,
            llm_ms => format!("{:.0}", millis(timings.completion)),
            tool_ms => format!("{:.0}", millis(timings.tools)),
            total_ms => format!("{:.0}", millis(elapsed)),
            highlight_status => highlighted.map(highlight_status),
        };

        self.render(TOOLS_TEMPLATE, ctx).unwrap_or_else(|| {
            if reports.is_empty() {
                content.to_string()
            } else {
                format!("{} tool calls completed.", reports.len())
            }
        })
    }

    /// User-facing text for a failed resolve. Validation messages pass
    /// through unchanged.
    pub fn render_error(&self, err: &QueryError) -> String {
        let ctx = match err {
            QueryError::Validation(validation) => return validation.to_string(),
            QueryError::SqlGeneration { raw_response, .. } => context! {
                kind => "sql_generation",
                raw_response => raw_response,
            },
            QueryError::QueryExecution { detail, sql_query } => context! {
                kind => "query_execution",
                detail => detail,
                sql_query => sql_query,
            },
            QueryError::Unexpected { detail, sql_query } => context! {
                kind => "unexpected",
                detail => detail,
                sql_query => sql_query,
            },
        };

        self.render(ERROR_TEMPLATE, ctx)
            .unwrap_or_else(|| format!("An unexpected error occurred: {}", err))
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Option<String> {
        let rendered = self
            .env
            .get_template(name)
            .and_then(|tmpl| tmpl.render(ctx));
        match rendered {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Template render error: {}", e);
                None
            }
        }
    }
}

/// Numbers with thousands separators and at most one decimal. Anything else
/// is printed as is.
fn number(value: Value) -> String {
    let n = match f64::try_from(value.clone()) {
        Ok(n) if value.kind() == ValueKind::Number && n.is_finite() => n,
        _ => return value.to_string(),
    };
    let text = if n.fract() == 0.0 {
        format!("{:.0}", n.abs())
    } else {
        format!("{:.1}", n.abs())
    };
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut out = String::with_capacity(text.len() + whole.len() / 3 + 1);
    if n < 0.0 {
        out.push('-');
    }
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::ValidationError;
    use crate::query::tools::{RegionCount, ToolOutput};
    use serde_json::Map;

    fn rows(names: &[(&str, &str)]) -> Vec<CountryRow> {
        names
            .iter()
            .map(|(name, iso)| CountryRow {
                name: name.to_string(),
                iso_a3: iso.to_string(),
                extra: Map::new(),
            })
            .collect()
    }

    fn formatter() -> MessageFormatter {
        MessageFormatter::new(5).unwrap()
    }

    #[test]
    fn single_result() {
        let timings = StageTimings {
            generation: Duration::from_micros(1300),
            execution: Duration::from_micros(300),
        };
        let message = formatter().render_result(
            &rows(&[("France", "FRA")]),
            "SELECT name FROM countries",
            Duration::from_millis(42),
            &timings,
            1,
        );

        assert!(message.contains("1 country found"));
        assert!(message.contains("42ms"));
        assert!(message.contains(r#"<span class="country-link" data-iso="FRA">France</span>"#));
        assert!(!message.contains("toggle-countries"));
        assert!(message.contains(r#"<button class="show-sql-btn" data-target="sql-details">"#));
        assert!(message.contains("<pre>SELECT name FROM countries</pre>"));
        assert!(message.contains("SQL Gen: 1.3ms, Execution: 0.3ms"));
        assert!(message.contains("1 country highlighted."));
    }

    #[test]
    fn long_results_are_truncated_with_toggle() {
        let all = rows(&[
            ("Austria", "AUT"),
            ("Belgium", "BEL"),
            ("Croatia", "HRV"),
            ("Denmark", "DNK"),
            ("Estonia", "EST"),
            ("Finland", "FIN"),
            ("France", "FRA"),
        ]);
        let message = formatter().render_result(
            &all,
            "SELECT name FROM countries",
            Duration::from_millis(5),
            &StageTimings::default(),
            7,
        );

        assert!(message.contains("7 countries found"));
        assert!(message.contains(r#"data-iso="EST">Estonia</span>, and 2 more</span>"#));
        assert!(message.contains(r##"<a href="#" class="toggle-countries">(Show all)</a>"##));
        assert!(message.contains(r#"class="full-countries-list""#));
        assert_eq!(message.matches(r#"data-iso="FRA""#).count(), 1);
        assert_eq!(message.matches(r#"data-iso="AUT""#).count(), 2);
        assert!(message.contains("7 countries highlighted."));
        assert!(message.contains("SQL Gen: 0.0ms, Execution: 0.0ms"));
    }

    #[test]
    fn empty_result() {
        let message = formatter().render_result(
            &[],
            "SELECT name FROM countries",
            Duration::ZERO,
            &StageTimings::default(),
            0,
        );
        assert!(message.contains("0 countries found"));
        assert!(message.contains("No countries found"));
        assert!(message.contains("No countries highlighted."));
    }

    #[test]
    fn markup_in_values_is_escaped() {
        let message = formatter().render_result(
            &rows(&[("<b>Bold</b>", "BLD")]),
            "SELECT 1",
            Duration::ZERO,
            &StageTimings::default(),
            1,
        );
        assert!(message.contains("&lt;b&gt;Bold"));
        assert!(!message.contains("<b>Bold"));
    }

    #[test]
    fn error_templates_by_kind() {
        let f = formatter();

        let message =
            f.render_error(&QueryError::sql_generation("nope", "I cannot help with that"));
        assert!(
            message.starts_with("<div class='error'>I couldn't understand how to create a query")
        );
        assert!(message.contains("<br><br>LLM response: I cannot help with that"));

        let message = f.render_error(&QueryError::query_execution(
            "no such column colour",
            "SELECT colour",
        ));
        assert!(message.contains("There was an error executing the SQL query."));
        assert!(
            message.contains("SQL Query: SELECT colour<br>Error details: no such column colour")
        );

        let message = f.render_error(&QueryError::unexpected("engine crashed"));
        assert!(message.contains("An unexpected error occurred: engine crashed"));
        assert!(!message.contains("SQL Query"));

        let message = f.render_error(&QueryError::Validation(ValidationError::EmptyQuery));
        assert_eq!(message, "Please enter a question about countries.");
    }

    #[test]
    fn highlight_status_wording() {
        assert_eq!(highlight_status(0), "No countries highlighted.");
        assert_eq!(highlight_status(1), "1 country highlighted.");
        assert_eq!(highlight_status(12), "12 countries highlighted.");
    }

    #[test]
    fn numbers_are_grouped() {
        assert_eq!(number(Value::from(68000000)), "68,000,000");
        assert_eq!(number(Value::from(999)), "999");
        assert_eq!(number(Value::from(-1234.56)), "-1,234.6");
        assert_eq!(number(Value::from("Europe")), "Europe");
    }

    fn report(tool: &str, output: Option<ToolOutput>, error: Option<&str>) -> ToolReport {
        ToolReport {
            tool: tool.to_string(),
            output,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn tool_results_and_failures() {
        let mut france = rows(&[("France", "FRA")]);
        france[0].extra.insert("population".to_string(), serde_json::json!(68000000));

        let reports = vec![
            report(
                "get_country_details",
                Some(ToolOutput::Details {
                    countries: france,
                    sql: "SELECT 1".to_string(),
                }),
                None,
            ),
            report(
                "get_statistics",
                Some(ToolOutput::RegionCounts {
                    counts: vec![RegionCount {
                        region: "Europe".to_string(),
                        count: 2,
                    }],
                    sql: "SELECT 2".to_string(),
                }),
                None,
            ),
            report("compare_countries", None, Some("Unknown field: gdp")),
        ];
        let timings = ToolTimings {
            completion: Duration::from_millis(120),
            tools: Duration::from_millis(8),
        };
        let message = formatter().render_tools(
            &reports,
            "",
            Duration::from_millis(130),
            &timings,
            Some(1),
        );

        assert!(
            message.contains(r#"<strong class="country-link" data-iso="FRA">France</strong> (FRA)"#)
        );
        assert!(message.contains("<br>Population: 68,000,000"));
        assert!(message.contains("1. Europe - 2"));
        assert!(message.contains(r#"<div class="error">Tool compare_countries failed: Unknown field: gdp</div>"#));
        assert!(message.contains("LLM: 120ms, Tools: 8ms, Total: 130ms"));
        assert!(message.contains("1 country highlighted."));
        assert!(!message.contains("llm-response"));
    }

    #[test]
    fn direct_answer_without_tools() {
        let message = formatter().render_tools(
            &[],
            "France & Spain both use the <euro>",
            Duration::ZERO,
            &ToolTimings::default(),
            None,
        );
        assert!(message.contains(r#"<div class="llm-response">France &amp; Spain both use the &lt;euro&gt;</div>"#));
        assert!(!message.contains("tool-performance"));
        assert!(!message.contains("highlight-status"));
    }
}
