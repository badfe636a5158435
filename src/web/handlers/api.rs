use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analysis::QueryAnalysis;
use crate::llm::models::PromptMode;
use crate::query::PresentationResult;
use crate::query::collaborators::{DatasetSchema, MessageBuffer};
use crate::web::state::AppState;

#[derive(Debug, Deserialize, Clone)]
pub struct NlQueryRequest {
    pub question: String,
    pub mode: Option<PromptMode>,
    /// Let the model call the data tools for multi-part questions.
    #[serde(default)]
    pub tools: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub engine_ready: bool,
    pub cache_entries: usize,
    pub country_count: usize,
}

/// Resolves a question. Failures are part of the answer, so this always
/// responds 200 and reports the failure through `error_kind`.
pub async fn nl_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NlQueryRequest>,
) -> Json<PresentationResult> {
    info!("Natural language query: {}", request.question);

    let presenter = MessageBuffer::default();
    let result = if request.tools {
        state
            .engine
            .resolve_with_tools(&request.question, &state.layer, &presenter)
            .await
    } else {
        state
            .engine
            .resolve(&request.question, request.mode, &state.layer, &presenter)
            .await
    };

    debug!(
        "Query answered with {} highlighted (cached: {})",
        result.highlighted_count, result.cached
    );
    Json(result)
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<QueryAnalysis>, (StatusCode, String)> {
    if request.question.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Please enter a question about countries.".to_string(),
        ));
    }
    Ok(Json(state.engine.analyzer().classify(&request.question)))
}

pub async fn get_schema(State(state): State<Arc<AppState>>) -> Json<DatasetSchema> {
    Json(state.engine.executor().schema().clone())
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    let entries = state.engine.cache().len();
    state.engine.cache().clear();
    info!("Cleared {} cached queries", entries);
    StatusCode::NO_CONTENT
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        engine_ready: state.engine.is_ready().await,
        cache_entries: state.engine.cache().len(),
        country_count: state.layer.features().len(),
    })
}
