//! Question resolution: validate, consult the cache, analyze, prompt the
//! model, parse, execute, highlight, format and cache.

pub mod cache;
pub mod collaborators;
pub mod error;
pub mod format;
pub mod tools;

use crate::analysis::validation::{ResultValidation, validate_result};
use crate::analysis::{QueryAnalysis, QueryAnalyzer};
use crate::config::{AppConfig, LlmConfig};
use crate::llm::models::{
    ChatReply, CompletionRequest, PromptMode, RawModelOutput, SqlGenerationResult,
};
use crate::llm::parser::{parse_sql, parse_structured};
use crate::llm::prompt::{build_prompt, completion_request};
use crate::llm::{CompletionEngine, LlmError, LlmManager};
use crate::util::retry::retry_operation;
use cache::{CacheEntry, QueryCache};
use collaborators::{
    ExecutionError, HighlightPredicate, MapHighlighter, MessagePresenter, SqlExecutor,
};
use error::{ErrorKind, QueryError, ValidationError};
use format::{MessageFormatter, StageTimings, ToolTimings};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tools::ToolReport;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub mode: PromptMode,
    pub display_limit: usize,
    pub temperature: f32,
    pub completion_timeout: Option<Duration>,
}

impl QuerySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.query.mode,
            display_limit: config.query.display_limit,
            temperature: config.llm.temperature,
            completion_timeout: config.llm.completion_timeout(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Outcome of one `resolve`, successful or not. The message has already
/// been handed to the presenter.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationResult {
    pub message: String,
    pub highlighted_count: usize,
    pub highlighted: Vec<String>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QueryAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ResultValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Tools the model called, in call order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

impl PresentationResult {
    fn failed(message: String, err: &QueryError) -> Self {
        Self {
            message,
            highlighted_count: 0,
            highlighted: Vec::new(),
            cached: false,
            sql: err.sql_query().map(str::to_string),
            analysis: None,
            validation: None,
            error_kind: Some(err.kind()),
            tools: Vec::new(),
        }
    }
}

pub struct QueryEngine {
    settings: QuerySettings,
    analyzer: QueryAnalyzer,
    executor: Arc<dyn SqlExecutor>,
    completion: RwLock<Option<Arc<dyn CompletionEngine>>>,
    cache: QueryCache,
    formatter: MessageFormatter,
}

impl QueryEngine {
    pub fn new(config: &AppConfig, executor: Arc<dyn SqlExecutor>) -> Result<Self, QueryError> {
        let analyzer = QueryAnalyzer::from_config(&config.query)
            .map_err(|e| QueryError::unexpected(format!("Failed to load keyword tables: {}", e)))?;
        let formatter = MessageFormatter::new(config.query.display_limit).map_err(|e| {
            QueryError::unexpected(format!("Failed to load message templates: {}", e))
        })?;

        Ok(Self {
            settings: QuerySettings::from_config(config),
            analyzer,
            executor,
            completion: RwLock::new(None),
            cache: QueryCache::new(config.query.cache_capacity),
            formatter,
        })
    }

    /// Connects the configured backend, retrying with linear backoff, and
    /// installs it as the completion engine.
    pub async fn init(&self, config: &LlmConfig) -> Result<(), LlmError> {
        info!("Initializing {} backend with model {}", config.backend, config.model);

        let manager = retry_operation(
            move || async move {
                let manager = LlmManager::new(config)?;
                manager.warm_up().await?;
                Ok::<_, LlmError>(manager)
            },
            config.init_attempts,
            config.init_delay(),
        )
        .await?;

        self.attach(Arc::new(manager)).await;
        info!("Language model ready");
        Ok(())
    }

    /// Installs an already constructed completion engine.
    pub async fn attach(&self, engine: Arc<dyn CompletionEngine>) {
        *self.completion.write().await = Some(engine);
    }

    /// Drops the completion engine and forgets every cached result.
    pub async fn dispose(&self) {
        *self.completion.write().await = None;
        self.cache.clear();
        info!("Query engine disposed");
    }

    pub async fn is_ready(&self) -> bool {
        self.completion.read().await.is_some()
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<dyn SqlExecutor> {
        &self.executor
    }

    /// Natural language to SQL, without executing it.
    pub async fn generate_sql(
        &self,
        query: &str,
        mode: Option<PromptMode>,
    ) -> Result<SqlGenerationResult, QueryError> {
        let (query, engine) = self.validate(query).await?;
        self.generate_with(engine.as_ref(), query, mode).await
    }

    /// Answers a question end to end. Every outcome, including failures, is
    /// delivered to `presenter` exactly once.
    pub async fn resolve(
        &self,
        query: &str,
        mode: Option<PromptMode>,
        map: &dyn MapHighlighter,
        presenter: &dyn MessagePresenter,
    ) -> PresentationResult {
        let started = Instant::now();

        match self.run(query, mode, map, started).await {
            Ok(result) => {
                presenter.present(&result.message);
                result
            }
            Err(err) => {
                match &err {
                    QueryError::Validation(_) => warn!("Rejected query: {}", err),
                    _ => error!("Error processing query: {}", err),
                }
                let message = self.formatter.render_error(&err);
                presenter.present(&message);
                PresentationResult::failed(message, &err)
            }
        }
    }

    /// Answers multi-part questions by letting the model call the data
    /// tools. Simple questions, and any failure to get a reply from the
    /// model, go through [`resolve`](Self::resolve) instead. Tool answers are
    /// not cached.
    pub async fn resolve_with_tools(
        &self,
        query: &str,
        map: &dyn MapHighlighter,
        presenter: &dyn MessagePresenter,
    ) -> PresentationResult {
        let started = Instant::now();

        let (trimmed, engine) = match self.validate(query).await {
            Ok(validated) => validated,
            Err(_) => return self.resolve(query, None, map, presenter).await,
        };

        let analysis = self.analyzer.classify(trimmed);
        if !tools::wants_tools(&analysis) {
            debug!("Question is simple enough for SQL generation");
            return self.resolve(query, None, map, presenter).await;
        }

        match self
            .run_tools(trimmed, engine.as_ref(), analysis, map, started)
            .await
        {
            Ok(result) => {
                presenter.present(&result.message);
                result
            }
            Err(e) => {
                warn!("Tool processing failed, falling back to SQL generation: {}", e);
                self.resolve(query, None, map, presenter).await
            }
        }
    }

    async fn run_tools(
        &self,
        query: &str,
        engine: &dyn CompletionEngine,
        analysis: QueryAnalysis,
        map: &dyn MapHighlighter,
        started: Instant,
    ) -> Result<PresentationResult, LlmError> {
        info!("Processing query with tools: {}", query);

        debug!("Stage: completing with tools");
        let request = tools::tool_request(query, self.settings.temperature);
        let completion_started = Instant::now();
        let reply: ChatReply = self.timed(engine.complete_with_tools(&request)).await?;
        let completion = completion_started.elapsed();

        if reply.tool_calls.is_empty() && reply.content.trim().is_empty() {
            return Err(LlmError::ResponseError(
                "Model returned neither text nor tool calls".to_string(),
            ));
        }

        debug!("Stage: running {} tool calls", reply.tool_calls.len());
        let tools_started = Instant::now();
        let mut reports = Vec::with_capacity(reply.tool_calls.len());
        for call in &reply.tool_calls {
            let report = ToolReport::run(call, self.executor.as_ref()).await;
            if let Some(e) = &report.error {
                warn!("Tool {} failed: {}", call.name, e);
            }
            reports.push(report);
        }
        let timings = ToolTimings {
            completion,
            tools: tools_started.elapsed(),
        };

        // The last tool that named countries decides the highlight
        let predicate = reports
            .iter()
            .rev()
            .filter_map(|r| r.output.as_ref())
            .map(|output| output.countries())
            .find(|countries| !countries.is_empty())
            .map(HighlightPredicate::from_rows);
        let highlighted_count = predicate.as_ref().map(|p| map.highlight(p));

        let message = self.formatter.render_tools(
            &reports,
            reply.content.trim(),
            started.elapsed(),
            &timings,
            highlighted_count,
        );

        info!(
            "Resolved \"{}\" with {} tool calls in {}ms",
            query,
            reports.len(),
            started.elapsed().as_millis()
        );

        Ok(PresentationResult {
            message,
            highlighted_count: highlighted_count.unwrap_or(0),
            highlighted: predicate
                .map(|p| p.codes().map(str::to_string).collect())
                .unwrap_or_default(),
            cached: false,
            sql: None,
            analysis: Some(analysis),
            validation: None,
            error_kind: None,
            tools: reports.into_iter().map(|r| r.tool).collect(),
        })
    }

    async fn run(
        &self,
        query: &str,
        mode: Option<PromptMode>,
        map: &dyn MapHighlighter,
        started: Instant,
    ) -> Result<PresentationResult, QueryError> {
        let (query, engine) = self.validate(query).await?;

        if let Some(entry) = self.cache.get(query) {
            info!("Cache hit for query: {}", query);
            let highlighted_count = map.highlight(&entry.highlight);
            return Ok(PresentationResult {
                message: entry.rendered_message,
                highlighted_count,
                highlighted: entry.highlight.codes().map(str::to_string).collect(),
                cached: true,
                sql: None,
                analysis: None,
                validation: None,
                error_kind: None,
                tools: Vec::new(),
            });
        }

        let generation_started = Instant::now();
        let generated = self.generate_with(engine.as_ref(), query, mode).await?;
        let generation = generation_started.elapsed();

        debug!("Stage: executing");
        let execution_started = Instant::now();
        let mut rows = self
            .executor
            .execute(&generated.sql)
            .await
            .map_err(|e| match e {
                ExecutionError::Internal(detail) => QueryError::Unexpected {
                    detail,
                    sql_query: Some(generated.sql.clone()),
                },
                other => QueryError::query_execution(other.to_string(), generated.sql.clone()),
            })?;
        let execution = execution_started.elapsed();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Query returned {} rows", rows.len());

        let validation = validate_result(&generated.analysis, &generated.sql, rows.len());
        if !validation.is_valid {
            warn!("Result validation issues: {:?}", validation.issues);
        }

        debug!("Stage: highlighting");
        let predicate = HighlightPredicate::from_rows(&rows);
        let highlighted_count = map.highlight(&predicate);

        debug!("Stage: formatting");
        let timings = StageTimings {
            generation,
            execution,
        };
        let message = self.formatter.render_result(
            &rows,
            &generated.sql,
            started.elapsed(),
            &timings,
            highlighted_count,
        );

        debug!("Stage: caching");
        self.cache.set(
            query,
            CacheEntry {
                rendered_message: message.clone(),
                highlight: predicate.clone(),
            },
        );

        info!(
            "Resolved \"{}\": {} rows, {} highlighted in {}ms",
            query,
            rows.len(),
            highlighted_count,
            started.elapsed().as_millis()
        );

        Ok(PresentationResult {
            message,
            highlighted_count,
            highlighted: predicate.codes().map(str::to_string).collect(),
            cached: false,
            sql: Some(generated.sql),
            analysis: Some(generated.analysis),
            validation: Some(validation),
            error_kind: None,
            tools: Vec::new(),
        })
    }

    async fn validate<'q>(
        &self,
        query: &'q str,
    ) -> Result<(&'q str, Arc<dyn CompletionEngine>), QueryError> {
        debug!("Stage: validating");
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let engine = self
            .completion
            .read()
            .await
            .clone()
            .ok_or(ValidationError::EngineNotInitialized)?;
        Ok((query, engine))
    }

    async fn generate_with(
        &self,
        engine: &dyn CompletionEngine,
        query: &str,
        mode: Option<PromptMode>,
    ) -> Result<SqlGenerationResult, QueryError> {
        let mode = mode.unwrap_or(self.settings.mode);

        debug!("Stage: analyzing");
        let analysis = self.analyzer.classify(query);

        debug!("Stage: prompting ({} mode)", mode);
        let schema = self.executor.schema();
        let prompt = build_prompt(query, &analysis, &schema.fields, &schema.sample_row, mode);
        let request = completion_request(prompt, mode, self.settings.temperature);

        debug!("Stage: completing");
        let raw = self.complete(engine, &request).await?;
        debug!("Raw model output: {}", raw);

        debug!("Stage: parsing");
        let (sql, raw_model_output) = match mode {
            PromptMode::Plain => (parse_sql(&raw)?, RawModelOutput::Text(raw)),
            PromptMode::Structured => {
                let response = parse_structured(&raw)?;
                (response.sql.clone(), RawModelOutput::Structured(response))
            }
        };
        info!("Generated SQL: {}", sql);

        Ok(SqlGenerationResult {
            sql,
            analysis,
            raw_model_output,
        })
    }

    async fn complete(
        &self,
        engine: &dyn CompletionEngine,
        request: &CompletionRequest,
    ) -> Result<String, LlmError> {
        self.timed(engine.complete(request)).await
    }

    /// Applies the configured completion timeout, if any.
    async fn timed<T>(
        &self,
        completion: impl Future<Output = Result<T, LlmError>>,
    ) -> Result<T, LlmError> {
        match self.settings.completion_timeout {
            Some(limit) => tokio::time::timeout(limit, completion)
                .await
                .map_err(|_| LlmError::Timeout(limit))?,
            None => completion.await,
        }
    }
}
