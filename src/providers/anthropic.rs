//! Anthropic Messages API provider
//!
//! Converts the relay's conversation types into a `POST /v1/messages` request
//! and the response back into [`ContentBlock`]s. Raw MCP tool output is
//! reshaped into Anthropic content blocks here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AnthropicConfig;
use crate::error::{RelayError, Result};
use crate::mcp::catalog::ToolDescriptor;
use crate::providers::{
    validate_history, ContentBlock, Message, ModelRequest, Provider, ToolResultBlock,
    ToolResultContent,
};

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API provider
///
/// # Examples
///
/// ```no_run
/// use mcp_relay::config::AnthropicConfig;
/// use mcp_relay::providers::AnthropicProvider;
///
/// # fn example() -> mcp_relay::error::Result<()> {
/// let provider = AnthropicProvider::new(AnthropicConfig::default(), "sk-ant-...".to_string())?;
/// # Ok(())
/// # }
/// ```
pub struct AnthropicProvider {
    client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl AnthropicProvider {
    /// Create a new provider
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ModelEndpoint`] if the HTTP client cannot be
    /// built.
    pub fn new(config: AnthropicConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("mcp-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                RelayError::ModelEndpoint(format!("Failed to create HTTP client: {}", e))
            })?;

        tracing::info!(
            "Initialized Anthropic provider: api_base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|message| match message {
                Message::UserText(text) => AnthropicMessage {
                    role: "user",
                    content: Value::String(text.clone()),
                },
                Message::Assistant(blocks) => AnthropicMessage {
                    role: "assistant",
                    content: Value::Array(blocks.iter().map(Self::convert_block).collect()),
                },
                Message::ToolResults(results) => AnthropicMessage {
                    role: "user",
                    content: Value::Array(results.iter().map(Self::convert_result).collect()),
                },
            })
            .collect()
    }

    fn convert_block(block: &ContentBlock) -> Value {
        match block {
            ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
            ContentBlock::ToolUse(request) => json!({
                "type": "tool_use",
                "id": request.id,
                "name": request.name,
                "input": request.arguments,
            }),
        }
    }

    fn convert_result(result: &ToolResultBlock) -> Value {
        let content = match &result.content {
            ToolResultContent::Error(message) => Value::String(message.clone()),
            ToolResultContent::Output(Value::Array(items)) => {
                Value::Array(items.iter().map(convert_mcp_content).collect())
            }
            ToolResultContent::Output(other) => {
                json!([{ "type": "text", "text": other.to_string() }])
            }
        };
        json!({
            "type": "tool_result",
            "tool_use_id": result.tool_use_id,
            "content": content,
            "is_error": result.is_error,
        })
    }

    fn convert_tools(tools: &[ToolDescriptor]) -> Vec<AnthropicTool<'_>> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.input_schema,
            })
            .collect()
    }

    fn convert_response(blocks: Vec<Value>) -> Result<Vec<ContentBlock>> {
        let mut converted = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                    converted.push(ContentBlock::text(text));
                }
                Some("tool_use") => {
                    let (Some(id), Some(name)) = (
                        block.get("id").and_then(Value::as_str),
                        block.get("name").and_then(Value::as_str),
                    ) else {
                        return Err(RelayError::ModelEndpoint(format!(
                            "tool_use block without id or name: {}",
                            block
                        ))
                        .into());
                    };
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    converted.push(ContentBlock::tool_use(id, name, input));
                }
                other => {
                    tracing::debug!("Skipping Anthropic content block of type {:?}", other);
                }
            }
        }
        Ok(converted)
    }
}

/// Reshape one MCP content item into an Anthropic tool_result content block.
fn convert_mcp_content(item: &Value) -> Value {
    match item.get("type").and_then(Value::as_str) {
        Some("text") => json!({
            "type": "text",
            "text": item.get("text").and_then(Value::as_str).unwrap_or_default(),
        }),
        Some("image") => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": item.get("mimeType").and_then(Value::as_str).unwrap_or("image/png"),
                "data": item.get("data").and_then(Value::as_str).unwrap_or_default(),
            }
        }),
        _ => json!({ "type": "text", "text": item.to_string() }),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<Vec<ContentBlock>> {
        validate_history(request.messages).map_err(RelayError::ModelEndpoint)?;

        let url = format!("{}/v1/messages", self.api_base);
        let body = AnthropicRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system: request.system,
            messages: Self::convert_messages(request.messages),
            tools: Self::convert_tools(request.tools),
        };

        tracing::debug!(
            "Sending Anthropic request: {} messages, {} tools",
            body.messages.len(),
            body.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Anthropic request failed: {}", e);
                RelayError::ModelEndpoint(format!("Anthropic request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Anthropic returned error {}: {}", status, error_text);
            return Err(RelayError::ModelEndpoint(format!(
                "Anthropic returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Anthropic response: {}", e);
            RelayError::ModelEndpoint(format!("Failed to parse Anthropic response: {}", e))
        })?;

        tracing::debug!(
            "Anthropic response: {} blocks, stop_reason={:?}",
            parsed.content.len(),
            parsed.stop_reason
        );

        Self::convert_response(parsed.content)
    }
}
