pub mod models;
pub mod parser;
pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use models::{ChatReply, CompletionRequest};
use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
    Timeout(Duration),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::Timeout(after) => write!(f, "LLM request timed out after {:?}", after),
        }
    }
}

impl Error for LlmError {}

/// Anything that turns a chat request into completion text.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Completion for a request that offers tools. Backends without tool
    /// support answer with text only.
    async fn complete_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatReply, LlmError> {
        Ok(ChatReply {
            content: self.complete(request).await?,
            tool_calls: Vec::new(),
        })
    }

    /// Checks the backend is reachable before it is put into service.
    async fn warm_up(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

pub struct LlmManager {
    engine: Box<dyn CompletionEngine>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let engine: Box<dyn CompletionEngine> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self { engine })
    }
}

#[async_trait]
impl CompletionEngine for LlmManager {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.engine.complete(request).await
    }

    async fn complete_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatReply, LlmError> {
        self.engine.complete_with_tools(request).await
    }

    async fn warm_up(&self) -> Result<(), LlmError> {
        self.engine.warm_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_a_config_error() {
        let config = LlmConfig {
            backend: "webgpu".to_string(),
            ..LlmConfig::default()
        };
        match LlmManager::new(&config) {
            Err(LlmError::ConfigError(msg)) => assert_eq!(msg, "Unsupported LLM backend: webgpu"),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn remote_backend_requires_credentials() {
        let config = LlmConfig {
            backend: "remote".to_string(),
            api_url: Some("https://api.example.com/v1/chat/completions".to_string()),
            ..LlmConfig::default()
        };
        assert!(matches!(LlmManager::new(&config), Err(LlmError::ConfigError(_))));
    }

    #[test]
    fn ollama_backend_has_local_defaults() {
        assert!(LlmManager::new(&LlmConfig::default()).is_ok());
    }
}
