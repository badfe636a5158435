use async_trait::async_trait;
use nl_atlas::analysis::{Complexity, Intent};
use nl_atlas::config::{AppConfig, DatasetConfig};
use nl_atlas::db::dataset::CountryDataset;
use nl_atlas::llm::models::CompletionRequest;
use nl_atlas::llm::{CompletionEngine, LlmError};
use nl_atlas::query::QueryEngine;
use nl_atlas::query::collaborators::{FeatureLayer, MessageBuffer, SqlExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Answers every prompt with the canonical Europe query, as JSON.
struct EuropeModel;

#[async_trait]
impl CompletionEngine for EuropeModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        assert!(request.messages[0].content.contains("Available fields: name, ISO_A3, region"));
        Ok(r#"```json
{"sql": "SELECT name, ISO_A3 FROM countries WHERE region = 'Europe' ORDER BY name", "queryType": "geographic", "confidence": 0.95}
```"#
            .to_string())
    }
}

fn fixture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("countries.csv");
    std::fs::write(
        &path,
        "name,ISO_A3,region\nFrance,FRA,Europe\nUSA,USA,Americas\n",
    )
    .unwrap();
    path
}

/// The returned directory must outlive the engine's use of the dataset.
async fn setup() -> (TempDir, QueryEngine, FeatureLayer) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        dataset: DatasetConfig {
            path: fixture(&dir),
            ..DatasetConfig::default()
        },
        ..AppConfig::default()
    };

    let dataset = Arc::new(CountryDataset::load(&config.dataset).unwrap());
    let layer = FeatureLayer::new(dataset.features().to_vec());
    let engine = QueryEngine::new(&config, dataset).unwrap();
    engine.attach(Arc::new(EuropeModel)).await;
    (dir, engine, layer)
}

#[tokio::test]
async fn countries_in_europe() {
    let (_dir, engine, layer) = setup().await;

    let analysis = engine.analyzer().classify("Countries in Europe");
    assert_eq!(analysis.intent, Intent::Geographic);
    assert_eq!(analysis.complexity, Complexity::Low);
    assert_eq!(analysis.entities.regions, vec!["europe"]);
    assert!(analysis.entities.countries.is_empty());

    let presenter = MessageBuffer::default();
    let result = engine.resolve("Countries in Europe", None, &layer, &presenter).await;

    assert_eq!(result.error_kind, None);
    assert_eq!(
        result.sql.as_deref(),
        Some("SELECT name, ISO_A3 FROM countries WHERE region = 'Europe' ORDER BY name")
    );
    assert!(result.message.contains("1 country found"));
    assert!(result.message.contains(r#"<span class="country-link" data-iso="FRA">France</span>"#));
    assert_eq!(result.highlighted_count, 1);
    assert_eq!(layer.highlighted(), vec!["FRA"]);
    assert_eq!(presenter.len(), 1);
}

#[tokio::test]
async fn invalid_generated_sql_is_an_execution_error() {
    let (_dir, engine, layer) = setup().await;

    let err = engine
        .executor()
        .execute("SELECT name, ISO_A3 FROM countries WHERE colour = 'red'")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("colour"));

    // The schema the prompt is built from reflects the loaded file
    let schema = engine.executor().schema();
    assert_eq!(schema.fields, vec!["name", "ISO_A3", "region"]);
    assert_eq!(schema.sample_row["name"], "France");
    assert_eq!(layer.features().len(), 2);
}
