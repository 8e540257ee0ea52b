//! Test utilities for mcp-relay
//!
//! Scripted stand-ins for the two external seams: tool sessions and the model
//! endpoint. Both record what happened so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::mcp::config::ServerConfig;
use crate::mcp::session::{SessionFactory, SessionState, ToolOutput, ToolSession};
use crate::mcp::types::McpTool;
use crate::providers::{ContentBlock, Message, ModelRequest, Provider};

/// Shared, ordered record of session events such as `init:a` or `close:a`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// A minimal tool advertisement
///
/// # Examples
///
/// ```ignore
/// let tool = mcp_tool("read_file");
/// assert_eq!(tool.input_schema["type"], "object");
/// ```
pub fn mcp_tool(name: &str) -> McpTool {
    McpTool {
        name: name.to_string(),
        title: None,
        description: Some(format!("{} tool", name)),
        input_schema: serde_json::json!({ "type": "object" }),
        annotations: None,
    }
}

/// Text-only MCP content array.
pub fn text_content(text: &str) -> serde_json::Value {
    serde_json::json!([{ "type": "text", "text": text }])
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Output(ToolOutput),
    Failure(String),
}

/// A [`ToolSession`] whose behaviour is fixed up front.
#[derive(Debug)]
pub struct ScriptedSession {
    name: String,
    tools: Vec<McpTool>,
    replies: HashMap<String, ScriptedReply>,
    fail_initialize: Option<RelayError>,
    fail_list_tools: bool,
    fail_close: bool,
    state: SessionState,
    events: EventLog,
    live: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(name: &str, events: EventLog) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            replies: HashMap::new(),
            fail_initialize: None,
            fail_list_tools: false,
            fail_close: false,
            state: SessionState::Uninitialized,
            events,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_tool(mut self, name: &str) -> Self {
        self.tools.push(mcp_tool(name));
        self
    }

    /// Reply to `tool` with a text output.
    pub fn with_reply(mut self, tool: &str, text: &str) -> Self {
        self.replies.insert(
            tool.to_string(),
            ScriptedReply::Output(ToolOutput {
                content: text_content(text),
                is_error: false,
            }),
        );
        self
    }

    /// Fail calls to `tool` with a [`RelayError::ToolInvocation`].
    pub fn with_failure(mut self, tool: &str, cause: &str) -> Self {
        self.replies
            .insert(tool.to_string(), ScriptedReply::Failure(cause.to_string()));
        self
    }

    pub fn failing_initialize(self) -> Self {
        let name = self.name.clone();
        self.failing_initialize_with(RelayError::Connection {
            server: name,
            reason: "scripted initialize failure".to_string(),
        })
    }

    pub fn failing_initialize_with(mut self, error: RelayError) -> Self {
        self.fail_initialize = Some(error);
        self
    }

    pub fn failing_list_tools(mut self) -> Self {
        self.fail_list_tools = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn record(&self, event: String) {
        if let Ok(mut log) = self.events.lock() {
            log.push(event);
        }
    }
}

#[async_trait]
impl ToolSession for ScriptedSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn initialize(&mut self) -> Result<()> {
        self.record(format!("init:{}", self.name));
        if let Some(error) = self.fail_initialize.take() {
            self.state = SessionState::Closed;
            return Err(error.into());
        }
        self.state = SessionState::Ready;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        if self.fail_list_tools {
            return Err(RelayError::Mcp("scripted tools/list failure".to_string()).into());
        }
        Ok(self.tools.clone())
    }

    async fn invoke(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolOutput> {
        self.record(format!("invoke:{}:{}", self.name, tool));
        if self.state != SessionState::Ready {
            return Err(RelayError::ToolInvocation {
                tool: tool.to_string(),
                cause: format!("session is {}", self.state),
            }
            .into());
        }
        match self.replies.get(tool) {
            Some(ScriptedReply::Output(output)) => Ok(output.clone()),
            Some(ScriptedReply::Failure(cause)) => Err(RelayError::ToolInvocation {
                tool: tool.to_string(),
                cause: cause.clone(),
            }
            .into()),
            None => Ok(ToolOutput {
                content: text_content(&format!("{} called with {}", tool, arguments)),
                is_error: false,
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.record(format!("close:{}", self.name));
        if self.state == SessionState::Ready {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.state = SessionState::Closed;
        if self.fail_close {
            return Err(RelayError::McpTransport("scripted close failure".to_string()).into());
        }
        Ok(())
    }
}

/// Hands out pre-scripted sessions by name, default ones otherwise.
#[derive(Debug, Default)]
pub struct ScriptedSessionFactory {
    scripted: Mutex<HashMap<String, ScriptedSession>>,
    events: EventLog,
    live: Arc<AtomicUsize>,
}

impl ScriptedSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event log to pass to [`ScriptedSession::new`].
    pub fn events(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    /// Use `session` when a server with its name is created.
    pub fn script(&self, mut session: ScriptedSession) {
        session.live = Arc::clone(&self.live);
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(session.name.clone(), session);
        }
    }

    pub fn event_log(&self) -> Vec<String> {
        self.events.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Sessions initialized and not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SessionFactory for ScriptedSessionFactory {
    fn create(&self, config: &ServerConfig) -> Box<dyn ToolSession> {
        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut s| s.remove(&config.name));
        let session = scripted.unwrap_or_else(|| {
            let mut session = ScriptedSession::new(&config.name, self.events());
            session.live = Arc::clone(&self.live);
            session
        });
        Box::new(session)
    }
}

/// What a [`ScriptedProvider`] was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub model: String,
    pub max_tokens: u32,
}

/// A [`Provider`] that replays canned responses in order.
///
/// Once the script runs out, the last response repeats.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<Vec<ContentBlock>, String>>>,
    last: Mutex<Option<Vec<ContentBlock>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Vec<ContentBlock>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Queue a failing call.
    pub fn then_fail(self, message: &str) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.to_string()));
        }
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<Vec<ContentBlock>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                system: request.system.to_string(),
                messages: request.messages.to_vec(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
                model: request.model.to_string(),
                max_tokens: request.max_tokens,
            });
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(blocks)) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(blocks.clone());
                }
                Ok(blocks)
            }
            Some(Err(message)) => Err(RelayError::ModelEndpoint(message).into()),
            None => self
                .last
                .lock()
                .ok()
                .and_then(|last| last.clone())
                .ok_or_else(|| RelayError::ModelEndpoint("script exhausted".to_string()).into()),
        }
    }
}
