use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, warn};

use nl_atlas::analysis::QueryAnalyzer;
use nl_atlas::config::{AppConfig, CliArgs, Command};
use nl_atlas::db::dataset::CountryDataset;
use nl_atlas::llm::models::PromptMode;
use nl_atlas::query::QueryEngine;
use nl_atlas::query::collaborators::{FeatureLayer, MessageBuffer};
use nl_atlas::util::logging::init_tracing;
use nl_atlas::web;
use nl_atlas::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let command = args.command.clone().unwrap_or(Command::Serve);

    // Analysis needs neither the dataset nor a model
    if let Command::Analyze { question } = &command {
        let analyzer = QueryAnalyzer::from_config(&config.query)?;
        println!("{}", serde_json::to_string_pretty(&analyzer.classify(question))?);
        return Ok(());
    }

    info!("Loading country dataset from {}", config.dataset.path.display());
    let dataset = Arc::new(CountryDataset::load(&config.dataset)?);
    let layer = FeatureLayer::new(dataset.features().to_vec());

    let engine = Arc::new(QueryEngine::new(&config, dataset)?);

    match command {
        Command::Ask {
            question,
            plain,
            tools,
        } => {
            engine.init(&config.llm).await?;

            let presenter = MessageBuffer::default();
            let result = if tools {
                engine.resolve_with_tools(&question, &layer, &presenter).await
            } else {
                let mode = plain.then_some(PromptMode::Plain);
                engine.resolve(&question, mode, &layer, &presenter).await
            };

            println!("{}", result.message.trim());
            if !result.highlighted.is_empty() {
                println!("\nHighlighted: {}", result.highlighted.join(", "));
            }
            if let Some(kind) = result.error_kind {
                return Err(format!("Query failed ({:?})", kind).into());
            }
        }
        Command::Serve | Command::Analyze { .. } => {
            // The server comes up either way; /api/status reports readiness
            if let Err(e) = engine.init(&config.llm).await {
                warn!("Language model unavailable, queries will be rejected: {}", e);
            }

            let app_state = Arc::new(AppState::new(config.clone(), engine, layer));

            info!("Starting NL-Atlas server on {}:{}", config.web.host, config.web.port);
            match web::run_server(config.web, app_state).await {
                Ok(_) => info!("Server stopped gracefully"),
                Err(e) => {
                    error!("Server error: {}", e);
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
