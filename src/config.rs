use crate::llm::models::PromptMode;
use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf, // CSV or JSON file with one record per country
    pub table: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    /// Upper bound for a single completion call. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
    pub init_attempts: u32,
    pub init_delay_ms: u64,
}

impl LlmConfig {
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    pub mode: PromptMode,
    /// LRU bound for the result cache; unbounded when unset.
    pub cache_capacity: Option<usize>,
    pub display_limit: usize,
    /// Optional TOML/JSON file replacing the built-in keyword tables.
    pub keywords: Option<PathBuf>,
    pub confidence: f32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub query: QueryConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Country dataset to load (CSV or JSON)
    #[arg(long, value_name = "FILE")]
    pub dataset: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Answer a single question and print the rendered result
    Ask {
        question: String,
        /// Ask the model for bare SQL instead of a JSON object
        #[arg(long, default_value_t = false)]
        plain: bool,
        /// Let the model call data tools for multi-part questions
        #[arg(long, default_value_t = false)]
        tools: bool,
    },
    /// Print the heuristic analysis of a question as JSON
    Analyze { question: String },
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "config.toml",
                "config/config.toml",
                "/etc/nl-atlas/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NL_ATLAS_LLM__API_KEY and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("NL_ATLAS")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(dataset) = &args.dataset {
            config.dataset.path = dataset.clone();
        }

        Ok(config)
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/countries.csv"),
            table: "countries".to_string(),
            pool_size: 4,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            api_url: None,
            temperature: 0.3,
            timeout_secs: None,
            init_attempts: 2,
            init_delay_ms: 2000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::Structured,
            cache_capacity: None,
            display_limit: 5,
            keywords: None,
            confidence: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                "[llm]\nbackend = \"remote\"\ntimeout_secs = 30\n\n[query]\nmode = \"plain\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.llm.backend, "remote");
        assert_eq!(config.llm.completion_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.llm.init_attempts, 2);
        assert_eq!(config.query.mode, PromptMode::Plain);
        assert_eq!(config.query.display_limit, 5);
        assert_eq!(config.query.cache_capacity, None);
        assert_eq!(config.dataset.table, "countries");
        assert_eq!(config.web.port, 3000);
    }
}
