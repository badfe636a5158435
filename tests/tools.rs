use async_trait::async_trait;
use nl_atlas::config::{AppConfig, DatasetConfig};
use nl_atlas::db::dataset::CountryDataset;
use nl_atlas::llm::models::{ChatReply, CompletionRequest, ToolCall};
use nl_atlas::llm::{CompletionEngine, LlmError};
use nl_atlas::query::QueryEngine;
use nl_atlas::query::collaborators::{FeatureLayer, MessageBuffer};
use nl_atlas::query::error::ErrorKind;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const COUNTRIES: &str = "\
name,ISO_A3,region,population,area,languages,currencies,flagDescription
France,FRA,Europe,68000000,551695,French,Euro,blue white red
Spain,ESP,Europe,48000000,505990,Spanish,Euro,red yellow
Mexico,MEX,Americas,128000000,1964375,Spanish,Peso,green white red
Japan,JPN,Asia,125000000,377975,Japanese,Yen,white red
";

/// Answers tool requests with a canned reply and SQL requests with `sql`.
struct ToolModel {
    reply: Result<ChatReply, String>,
    sql: String,
    tool_requests: AtomicUsize,
    sql_requests: AtomicUsize,
}

impl ToolModel {
    fn calling(calls: &[(&str, Value)]) -> Arc<Self> {
        Self::with_reply(Ok(ChatReply {
            content: String::new(),
            tool_calls: calls
                .iter()
                .map(|(name, arguments)| ToolCall {
                    name: name.to_string(),
                    arguments: arguments.clone(),
                })
                .collect(),
        }))
    }

    fn with_reply(reply: Result<ChatReply, String>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            sql: "SELECT name, ISO_A3 FROM countries WHERE name IN ('France', 'Spain') ORDER BY name"
                .to_string(),
            tool_requests: AtomicUsize::new(0),
            sql_requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionEngine for ToolModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        self.sql_requests.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "sql": self.sql }).to_string())
    }

    async fn complete_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatReply, LlmError> {
        assert_eq!(request.tools.len(), 4);
        self.tool_requests.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(LlmError::ConnectionError)
    }
}

async fn setup(model: Arc<ToolModel>) -> (TempDir, QueryEngine, FeatureLayer) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("countries.csv");
    std::fs::write(&path, COUNTRIES).unwrap();

    let config = AppConfig {
        dataset: DatasetConfig {
            path,
            ..DatasetConfig::default()
        },
        ..AppConfig::default()
    };
    let dataset = Arc::new(CountryDataset::load(&config.dataset).unwrap());
    let layer = FeatureLayer::new(dataset.features().to_vec());
    let engine = QueryEngine::new(&config, dataset).unwrap();
    engine.attach(model).await;
    (dir, engine, layer)
}

const COMPARE_QUESTION: &str = "Compare the population and area of France and Spain";

#[tokio::test]
async fn comparison_runs_through_tools() {
    let model = ToolModel::calling(&[(
        "compare_countries",
        json!({"country_names": ["France", "Spain"], "metrics": ["population", "area"]}),
    )]);
    let (_dir, engine, layer) = setup(model.clone()).await;
    let presenter = MessageBuffer::default();

    let result = engine
        .resolve_with_tools(COMPARE_QUESTION, &layer, &presenter)
        .await;

    assert_eq!(result.error_kind, None);
    assert_eq!(result.tools, vec!["compare_countries"]);
    assert_eq!(result.highlighted, vec!["ESP", "FRA"]);
    assert_eq!(result.highlighted_count, 2);
    assert!(result.message.contains("Country Comparison"));
    assert!(result.message.contains("<td>68,000,000</td>"));
    assert!(result.message.contains(
        "population: highest 68,000,000, lowest 48,000,000, average 58,000,000"
    ));
    assert_eq!(layer.highlighted(), vec!["ESP", "FRA"]);
    assert_eq!(presenter.len(), 1);

    assert_eq!(model.tool_requests.load(Ordering::SeqCst), 1);
    assert_eq!(model.sql_requests.load(Ordering::SeqCst), 0);
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn failed_tool_does_not_stop_the_others() {
    let model = ToolModel::calling(&[
        ("get_country_details", json!({"country_names": ["Mexico"], "fields": ["gdp"]})),
        ("search_countries", json!({"language": "spanish", "min_population": 100000000})),
    ]);
    let (_dir, engine, layer) = setup(model).await;

    let result = engine
        .resolve_with_tools(
            "Which Spanish speaking countries have more than 100 million people?",
            &layer,
            &MessageBuffer::default(),
        )
        .await;

    assert_eq!(result.tools, vec!["get_country_details", "search_countries"]);
    assert!(result.message.contains("Tool get_country_details failed: Unknown field: gdp"));
    assert!(result.message.contains(r#"data-iso="MEX">Mexico</span>"#));
    assert_eq!(result.highlighted, vec!["MEX"]);
}

#[tokio::test]
async fn direct_answer_highlights_nothing() {
    let model = ToolModel::with_reply(Ok(ChatReply {
        content: "Both France and Spain use the Euro.".to_string(),
        tool_calls: Vec::new(),
    }));
    let (_dir, engine, layer) = setup(model).await;

    let result = engine
        .resolve_with_tools(COMPARE_QUESTION, &layer, &MessageBuffer::default())
        .await;

    assert!(
        result
            .message
            .contains(r#"<div class="llm-response">Both France and Spain use the Euro.</div>"#)
    );
    assert_eq!(result.highlighted_count, 0);
    assert!(result.tools.is_empty());
    assert_eq!(result.sql, None);
    assert!(layer.highlighted().is_empty());
}

#[tokio::test]
async fn model_failure_falls_back_to_sql_generation() {
    let model = ToolModel::with_reply(Err("connection refused".to_string()));
    let (_dir, engine, layer) = setup(model.clone()).await;
    let presenter = MessageBuffer::default();

    let result = engine
        .resolve_with_tools(COMPARE_QUESTION, &layer, &presenter)
        .await;

    assert_eq!(result.error_kind, None);
    assert!(result.tools.is_empty());
    assert!(result.sql.is_some());
    assert_eq!(result.highlighted, vec!["ESP", "FRA"]);
    assert!(result.message.contains("2 countries found"));
    assert_eq!(presenter.len(), 1);
    assert_eq!(model.tool_requests.load(Ordering::SeqCst), 1);
    assert_eq!(model.sql_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn simple_questions_skip_tools() {
    let model = ToolModel::calling(&[]);
    let (_dir, engine, layer) = setup(model.clone()).await;

    let result = engine
        .resolve_with_tools("Countries in Europe", &layer, &MessageBuffer::default())
        .await;

    assert!(result.sql.is_some());
    assert_eq!(model.tool_requests.load(Ordering::SeqCst), 0);
    assert_eq!(model.sql_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let model = ToolModel::calling(&[]);
    let (_dir, engine, layer) = setup(model.clone()).await;
    let presenter = MessageBuffer::default();

    let result = engine.resolve_with_tools("  ", &layer, &presenter).await;

    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert_eq!(result.message, "Please enter a question about countries.");
    assert_eq!(presenter.len(), 1);
    assert_eq!(model.tool_requests.load(Ordering::SeqCst), 0);
}
