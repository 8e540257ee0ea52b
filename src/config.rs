//! Configuration management for mcp-relay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{RelayError, Result};
use crate::mcp::config::McpConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for mcp-relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model endpoint configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Conversation loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// MCP server configuration
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Anthropic configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

fn default_provider_type() -> String {
    "anthropic".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

/// Anthropic Messages API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Model id to request
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// `max_tokens` sent with every request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Base URL, without the `/v1/messages` path
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// HTTP timeout per request (seconds)
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_anthropic_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_http_timeout() -> u64 {
    120
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool round-trips per conversation
    ///
    /// Counts completed round-trips, not model calls. The model is called
    /// once more after the last round-trip to see whether it is done, so a
    /// conversation makes up to `max_iterations + 1` model calls.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Inline system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// File holding the system prompt; wins over `system_prompt`
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,

    /// Directory the model is told to write created files into
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_max_iterations() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
            system_prompt_path: None,
            output_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(model) = std::env::var("MCP_RELAY_MODEL") {
            self.provider.anthropic.model = model;
        }

        if let Ok(max_tokens) = std::env::var("MCP_RELAY_MAX_TOKENS") {
            if let Ok(value) = max_tokens.parse() {
                self.provider.anthropic.max_tokens = value;
            } else {
                tracing::warn!("Invalid MCP_RELAY_MAX_TOKENS: {}", max_tokens);
            }
        }

        if let Ok(max_iterations) = std::env::var("MCP_RELAY_MAX_ITERATIONS") {
            if let Ok(value) = max_iterations.parse() {
                self.agent.max_iterations = value;
            } else {
                tracing::warn!("Invalid MCP_RELAY_MAX_ITERATIONS: {}", max_iterations);
            }
        }

        if let Ok(api_base) = std::env::var("MCP_RELAY_API_BASE") {
            self.provider.anthropic.api_base = api_base;
        }

        if let Ok(servers_file) = std::env::var("MCP_RELAY_SERVERS_FILE") {
            self.mcp.servers_file = Some(PathBuf::from(servers_file));
        }

        if let Ok(output_dir) = std::env::var("MCP_RELAY_OUTPUT_DIR") {
            self.agent.output_dir = Some(PathBuf::from(output_dir));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        let overrides = cli.overrides();
        if let Some(servers_file) = &overrides.servers_file {
            self.mcp.servers_file = Some(servers_file.clone());
        }
        if let Some(model) = &overrides.model {
            self.provider.anthropic.model = model.clone();
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type != "anthropic" {
            return Err(RelayError::Config(format!(
                "Invalid provider type: {}. Must be: anthropic",
                self.provider.provider_type
            ))
            .into());
        }

        if self.provider.anthropic.model.trim().is_empty() {
            return Err(RelayError::Config("anthropic.model cannot be empty".to_string()).into());
        }

        if self.provider.anthropic.max_tokens == 0 {
            return Err(RelayError::Config(
                "anthropic.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.provider.anthropic.timeout_seconds == 0 {
            return Err(RelayError::Config(
                "anthropic.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.max_iterations == 0 {
            return Err(
                RelayError::Config("max_iterations must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.max_iterations > 1000 {
            return Err(RelayError::Config(
                "max_iterations must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        self.mcp.validate()
    }

    /// Resolve the system prompt and prepare the output directory.
    ///
    /// `system_prompt_path` wins over `system_prompt`. With `output_dir` set,
    /// the directory is created and the model is told to use it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the prompt file cannot be read or the
    /// output directory cannot be created.
    pub fn system_prompt(&self) -> Result<String> {
        let mut prompt = match &self.agent.system_prompt_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                RelayError::Config(format!(
                    "Failed to read system prompt {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => self.agent.system_prompt.clone().unwrap_or_default(),
        };

        if let Some(dir) = &self.agent.output_dir {
            std::fs::create_dir_all(dir).map_err(|e| {
                RelayError::Config(format!(
                    "Failed to create output directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            prompt.push_str(&format!(
                "\n\nAll created files you create should be saved under the directory: {}. \
                 The directory has already been created for you.",
                dir.display()
            ));
        }

        Ok(prompt)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}
