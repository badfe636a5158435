use crate::config::LlmConfig;
use crate::llm::models::{ChatMessage, ChatReply, CompletionRequest, ResponseFormat, ToolCall};
use crate::llm::{CompletionEngine, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<FormatSpec>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Serialize)]
struct FormatSpec {
    #[serde(rename = "type")]
    kind: ResponseFormat,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RemoteToolCall>,
}

#[derive(Deserialize)]
struct RemoteToolCall {
    function: RemoteFunction,
}

/// `arguments` arrives as a JSON-encoded string.
#[derive(Deserialize)]
struct RemoteFunction {
    name: String,
    arguments: String,
}

impl From<ResponseMessage> for ChatReply {
    fn from(message: ResponseMessage) -> Self {
        ChatReply {
            content: message.content.unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall::from_text(call.function.name, call.function.arguments))
                .collect(),
        }
    }
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> PromptRequest<'a> {
        PromptRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_format.map(|kind| FormatSpec { kind }),
            tools: &request.tools,
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<ResponseMessage, LlmError> {
        debug!("Sending completion request to {} with model {}", self.api_url, self.model);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
    }
}

#[async_trait]
impl CompletionEngine for RemoteLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let message = self.send(request).await?;
        message
            .content
            .ok_or_else(|| LlmError::ResponseError("Response has no message content".to_string()))
    }

    async fn complete_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatReply, LlmError> {
        Ok(self.send(request).await?.into())
    }
}
