//! Model endpoint abstraction and the Anthropic implementation

pub mod anthropic;
pub mod base;

pub use anthropic::AnthropicProvider;
pub use base::{
    validate_history, ContentBlock, Message, ModelRequest, Provider, ToolResultBlock,
    ToolResultContent, ToolUseRequest,
};

use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{RelayError, Result};

/// Create a provider instance based on configuration
///
/// The API key is read from the environment variable named by
/// `anthropic.api_key_env`.
///
/// # Errors
///
/// Returns [`RelayError::Config`] if the provider type is unknown or the API
/// key is not set.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.provider_type.as_str() {
        "anthropic" => {
            let key_env = &config.anthropic.api_key_env;
            let api_key = std::env::var(key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    RelayError::Config(format!(
                        "Anthropic API key not found; set {} (a .env file works too)",
                        key_env
                    ))
                })?;
            Ok(Arc::new(AnthropicProvider::new(
                config.anthropic.clone(),
                api_key,
            )?))
        }
        other => Err(RelayError::Config(format!("Unknown provider type: {}", other)).into()),
    }
}
