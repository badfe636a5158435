use crate::config::LlmConfig;
use crate::llm::models::{ChatMessage, ChatReply, CompletionRequest, ResponseFormat, ToolCall};
use crate::llm::{CompletionEngine, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "http://localhost:11434/api/chat";

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    options: OllamaOptions,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize, Debug)]
struct OllamaToolCall {
    function: OllamaFunction,
}

/// Ollama sends `arguments` as an object; some models still send a string.
#[derive(Deserialize, Debug)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl From<ResponseMessage> for ChatReply {
    fn from(message: ResponseMessage) -> Self {
        ChatReply {
            content: message.content,
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|call| match call.function.arguments {
                    Value::String(text) => ToolCall::from_text(call.function.name, text),
                    arguments => ToolCall {
                        name: call.function.name,
                        arguments,
                    },
                })
                .collect(),
        }
    }
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let client = reqwest::Client::new();

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: match request.response_format {
                Some(ResponseFormat::JsonObject) => Some("json"),
                None => None,
            },
            tools: &request.tools,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    /// Model listing endpoint on the same server.
    fn tags_url(&self) -> String {
        match self.api_url.find("/api/") {
            Some(idx) => format!("{}/api/tags", &self.api_url[..idx]),
            None => format!("{}/api/tags", self.api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl CompletionEngine for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        Ok(self.send(request).await?.content)
    }

    async fn complete_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatReply, LlmError> {
        Ok(self.send(request).await?.into())
    }

    async fn warm_up(&self) -> Result<(), LlmError> {
        self.check_tags().await
    }
}

impl OllamaProvider {
    async fn send(&self, request: &CompletionRequest) -> Result<ResponseMessage, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response: OllamaResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
            LlmError::ResponseError(format!(
                "Failed to parse Ollama response: {} - Response was: {}",
                e, response_text
            ))
        })?;

        Ok(ollama_response.message)
    }

    async fn check_tags(&self) -> Result<(), LlmError> {
        let url = self.tags_url();
        debug!("Checking Ollama availability at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
