//! Configuration loading from switchboard.toml.

use mcp::Endpoint;
use runtime::DEFAULT_MAX_TOOL_ROUNDS;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Model backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tool servers to connect to, in connection order.
    #[serde(default)]
    pub servers: Vec<Endpoint>,

    /// Cap on model/tool exchange rounds per query.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Optional system prompt override.
    pub system: Option<String>,
}

/// Model backend configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API key. Falls back to the ANTHROPIC_API_KEY environment
    /// variable when absent.
    pub api_key: Option<String>,

    /// Maximum tokens per model reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Configuration used when no file is present: no servers, defaults
    /// everywhere, API key from the environment.
    pub fn default_config() -> Self {
        Self {
            backend: BackendConfig::default(),
            servers: Vec::new(),
            max_tool_rounds: default_max_tool_rounds(),
            system: None,
        }
    }

    /// The API key from config, or the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.backend.api_key {
            return Ok(key.clone());
        }
        std::env::var("ANTHROPIC_API_KEY").map_err(|_| ConfigError::MissingApiKey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no API key: set backend.api_key or the ANTHROPIC_API_KEY environment variable")]
    MissingApiKey,
}
