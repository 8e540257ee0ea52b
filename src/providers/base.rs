//! Base provider trait and conversation types
//!
//! The conversation is a list of [`Message`] turns. Assistant turns carry
//! [`ContentBlock`]s, which may include tool-use requests; the following user
//! turn answers each of them with a [`ToolResultBlock`].

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mcp::catalog::ToolDescriptor;
use crate::mcp::session::ToolOutput;

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content")]
pub enum Message {
    /// Plain user text.
    #[serde(rename = "user")]
    UserText(String),
    /// Everything the model returned for one call.
    #[serde(rename = "assistant")]
    Assistant(Vec<ContentBlock>),
    /// Answers to the preceding assistant turn's tool uses (user role).
    #[serde(rename = "tool_results")]
    ToolResults(Vec<ToolResultBlock>),
}

impl Message {
    /// Creates a user text message
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_relay::providers::Message;
    ///
    /// let msg = Message::user("Read a.txt");
    /// assert_eq!(msg, Message::UserText("Read a.txt".to_string()));
    /// ```
    pub fn user(text: impl Into<String>) -> Self {
        Message::UserText(text.into())
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Message::Assistant(blocks)
    }

    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Message::ToolResults(results)
    }

    /// Tool-use requests in this turn, in order. Empty for non-assistant turns.
    pub fn tool_uses(&self) -> Vec<&ToolUseRequest> {
        match self {
            Message::Assistant(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse(request) => Some(request),
                    ContentBlock::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Concatenated text blocks of an assistant turn, or the user text.
    pub fn text(&self) -> String {
        match self {
            Message::UserText(text) => text.clone(),
            Message::Assistant(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolUse(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Message::ToolResults(_) => String::new(),
        }
    }
}

/// A block of model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUseRequest),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse(ToolUseRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }
}

/// The model asking for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseRequest {
    /// Model-assigned id, echoed back in the result.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Payload of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultContent {
    /// The server's `content` array, untouched.
    Output(serde_json::Value),
    /// A relay-side failure message.
    Error(String),
}

/// The answer to one [`ToolUseRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: ToolResultContent,
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn output(tool_use_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::Output(output.content),
            is_error: output.is_error,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::Error(message.into()),
            is_error: true,
        }
    }
}

/// Everything the model endpoint needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDescriptor],
    pub model: &'a str,
    pub max_tokens: u32,
}

/// A model endpoint.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use mcp_relay::error::Result;
/// use mcp_relay::providers::{ContentBlock, ModelRequest, Provider};
///
/// struct Parrot;
///
/// #[async_trait]
/// impl Provider for Parrot {
///     async fn complete(&self, request: &ModelRequest<'_>) -> Result<Vec<ContentBlock>> {
///         let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
///         Ok(vec![ContentBlock::text(last)])
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one model call and return the assistant's content blocks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::ModelEndpoint`] if the call fails
    /// or the response cannot be understood.
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<Vec<ContentBlock>>;
}

/// Check that every tool-results turn answers the assistant turn right before
/// it, one result per tool use, with matching ids.
///
/// # Errors
///
/// Returns a description of the first violation found.
///
/// # Examples
///
/// ```
/// use mcp_relay::providers::{validate_history, Message, ToolResultBlock};
///
/// let history = vec![
///     Message::user("Do something"),
///     Message::tool_results(vec![ToolResultBlock::error("call_1", "nope")]),
/// ];
/// assert!(validate_history(&history).is_err());
/// ```
pub fn validate_history(messages: &[Message]) -> std::result::Result<(), String> {
    for (i, message) in messages.iter().enumerate() {
        let Message::ToolResults(results) = message else {
            continue;
        };

        let requested: Vec<&str> = match i.checked_sub(1).map(|p| &messages[p]) {
            Some(prev @ Message::Assistant(_)) => {
                prev.tool_uses().iter().map(|r| r.id.as_str()).collect()
            }
            _ => return Err(format!("tool results at turn {} do not follow an assistant turn", i)),
        };

        let mut answered = HashSet::new();
        for result in results {
            if !requested.contains(&result.tool_use_id.as_str()) {
                return Err(format!(
                    "tool result '{}' at turn {} has no matching tool use",
                    result.tool_use_id, i
                ));
            }
            if !answered.insert(result.tool_use_id.as_str()) {
                return Err(format!(
                    "tool use '{}' answered twice at turn {}",
                    result.tool_use_id, i
                ));
            }
        }
        if answered.len() != requested.len() {
            return Err(format!(
                "turn {} answers {} of {} tool uses",
                i,
                answered.len(),
                requested.len()
            ));
        }
    }
    Ok(())
}
