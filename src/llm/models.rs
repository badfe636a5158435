use crate::analysis::QueryAnalysis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How the model is asked to answer: bare SQL text or a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Plain,
    Structured,
}

impl PromptMode {
    pub fn max_tokens(self) -> u32 {
        match self {
            PromptMode::Plain => 300,
            PromptMode::Structured => 400,
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptMode::Plain => "plain",
            PromptMode::Structured => "structured",
        })
    }
}

impl FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(PromptMode::Plain),
            "structured" => Ok(PromptMode::Structured),
            other => Err(format!("Unknown prompt mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
}

/// Provider-neutral chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: Option<ResponseFormat>,
    /// Function definitions in the chat-completions tool schema. Empty for
    /// plain SQL generation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

/// A function call requested by the model. `arguments` holds the decoded
/// JSON, or the raw text when it did not decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn from_text(name: String, arguments: String) -> Self {
        let arguments = serde_json::from_str(&arguments).unwrap_or(Value::String(arguments));
        Self { name, arguments }
    }
}

/// Reply to a request that offered tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// JSON object the model returns in structured mode. Only `sql` is required.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredSqlResponse {
    pub sql: String,
    pub explanation: Option<String>,
    #[serde(rename = "queryType")]
    pub query_type: Option<String>,
    pub confidence: Option<f64>,
    pub intent: Option<String>,
    pub complexity: Option<String>,
    pub suggestions: Vec<String>,
}

impl StructuredSqlResponse {
    /// Reads the known fields from a decoded object, ignoring ill-typed
    /// optional ones. `None` when `sql` is absent or not a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            sql: text("sql")?,
            explanation: text("explanation"),
            query_type: text("queryType"),
            confidence: object.get("confidence").and_then(Value::as_f64),
            intent: text("intent"),
            complexity: text("complexity"),
            suggestions: object
                .get("suggestions")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// What the model actually said, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RawModelOutput {
    Text(String),
    Structured(StructuredSqlResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlGenerationResult {
    pub sql: String,
    pub analysis: QueryAnalysis,
    pub raw_model_output: RawModelOutput,
}
