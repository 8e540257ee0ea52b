//! Bounded conversation loop
//!
//! [`ConversationDriver::run`] alternates model calls and tool dispatch:
//!
//! ```text
//! AwaitingModel -> ModelResponded -> Done
//!                                 -> IterationCapReached
//!                                 -> AwaitingToolResults -> AwaitingModel
//! ```
//!
//! One iteration is one model -> tools -> model round-trip. When the model
//! asks for tools after `max_iterations` round-trips, the loop stops and the
//! history ends with that unanswered assistant turn.

use std::sync::Arc;

use serde::Serialize;

use crate::agent::dispatcher::Dispatcher;
use crate::error::{RelayError, Result};
use crate::mcp::catalog::ToolCatalog;
use crate::providers::{Message, ModelRequest, Provider, ToolUseRequest};

/// Per-conversation model settings.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Maximum tool round-trips; at least 1. Allows one model call more
    /// than this.
    pub max_iterations: usize,
    pub system_prompt: String,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without asking for tools.
    Done,
    /// The model still wanted tools when the round-trip budget ran out.
    IterationCapReached,
}

/// Result of one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOutcome {
    pub history: Vec<Message>,
    pub stop_reason: StopReason,
    /// Completed tool round-trips.
    pub iterations: usize,
}

impl ConversationOutcome {
    /// Text of the last assistant turn.
    pub fn final_text(&self) -> String {
        self.history
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant(_)))
            .map(Message::text)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    AwaitingModel,
    ModelResponded,
    AwaitingToolResults,
    Done,
    IterationCapReached,
}

/// Drives one conversation at a time against a model endpoint.
pub struct ConversationDriver {
    provider: Arc<dyn Provider>,
    settings: DriverSettings,
}

impl ConversationDriver {
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `max_iterations` is 0.
    pub fn new(provider: Arc<dyn Provider>, settings: DriverSettings) -> Result<Self> {
        if settings.max_iterations == 0 {
            return Err(
                RelayError::Config("max_iterations must be greater than 0".to_string()).into(),
            );
        }
        Ok(Self { provider, settings })
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Run a conversation seeded with `user_text`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ModelEndpoint`] if a model call fails. Tool
    /// failures never end the loop.
    pub async fn run(
        &self,
        user_text: &str,
        catalog: &ToolCatalog,
        dispatcher: &Dispatcher<'_>,
    ) -> Result<ConversationOutcome> {
        let mut history = vec![Message::user(user_text)];
        let mut iterations = 0usize;
        let mut state = DriverState::AwaitingModel;

        loop {
            tracing::debug!(?state, iterations, "Conversation step");
            state = match state {
                DriverState::AwaitingModel => {
                    let request = ModelRequest {
                        system: &self.settings.system_prompt,
                        messages: &history,
                        tools: catalog.snapshot(),
                        model: &self.settings.model,
                        max_tokens: self.settings.max_tokens,
                    };
                    let blocks = self.provider.complete(&request).await.map_err(|e| {
                        match e.downcast::<RelayError>() {
                            Ok(err @ RelayError::ModelEndpoint(_)) => anyhow::Error::from(err),
                            Ok(other) => RelayError::ModelEndpoint(other.to_string()).into(),
                            Err(e) => RelayError::ModelEndpoint(e.to_string()).into(),
                        }
                    })?;
                    history.push(Message::assistant(blocks));
                    DriverState::ModelResponded
                }
                DriverState::ModelResponded => {
                    let requested = history.last().map_or(0, |m| m.tool_uses().len());
                    if requested == 0 {
                        DriverState::Done
                    } else if iterations >= self.settings.max_iterations {
                        tracing::warn!(
                            max_iterations = self.settings.max_iterations,
                            pending_tool_calls = requested,
                            "Iteration cap reached; stopping with unanswered tool calls"
                        );
                        DriverState::IterationCapReached
                    } else {
                        DriverState::AwaitingToolResults
                    }
                }
                DriverState::AwaitingToolResults => {
                    let requests: Vec<ToolUseRequest> = history
                        .last()
                        .map(|m| m.tool_uses().into_iter().cloned().collect())
                        .unwrap_or_default();
                    let results = dispatcher.dispatch_all(&requests).await;
                    history.push(Message::tool_results(results));
                    iterations += 1;
                    DriverState::AwaitingModel
                }
                DriverState::Done => {
                    return Ok(Self::finish(history, StopReason::Done, iterations));
                }
                DriverState::IterationCapReached => {
                    return Ok(Self::finish(
                        history,
                        StopReason::IterationCapReached,
                        iterations,
                    ));
                }
            };
        }
    }

    fn finish(history: Vec<Message>, stop_reason: StopReason, iterations: usize) -> ConversationOutcome {
        tracing::info!(
            turns = history.len(),
            iterations,
            ?stop_reason,
            "Conversation finished"
        );
        ConversationOutcome {
            history,
            stop_reason,
            iterations,
        }
    }
}
