//! Transport sessions: one live connection to one tool server
//!
//! [`ToolSession`] is the seam the registry, catalog and dispatcher talk
//! through. [`StdioSession`] is the production implementation: it spawns the
//! server process, wires a [`JsonRpcClient`] onto its pipes and performs the
//! MCP handshake.
//!
//! Every resource acquired while connecting is registered on a
//! [`ReleaseStack`], so a half-finished `initialize` and a regular `close`
//! release through the same ordered path.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{Future, FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{RelayError, Result};
use crate::mcp::client::{start_read_loop, JsonRpcClient};
use crate::mcp::config::ServerConfig;
use crate::mcp::protocol::{InitializedMcpProtocol, McpProtocol};
use crate::mcp::transport::stdio::StdioTransport;
use crate::mcp::transport::Transport;
use crate::mcp::types::{ClientCapabilities, Implementation, McpTool};

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Raw result of a successful `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// The server's `content` array, untouched.
    pub content: serde_json::Value,
    /// The server's `isError` flag; `false` when absent.
    pub is_error: bool,
}

/// A connection to a single tool server.
#[async_trait::async_trait]
pub trait ToolSession: Send + Sync + fmt::Debug {
    /// Name of the backing server (the registry key).
    fn server_name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Launch the server and complete the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if the server cannot be launched or
    /// the handshake fails. Everything acquired so far is released first and
    /// the session ends up [`SessionState::Closed`].
    async fn initialize(&mut self) -> Result<()>;

    /// Tools the server currently advertises.
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    /// Call a tool and return its raw output.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ToolInvocation`] on any failure, including a
    /// session that is not ready.
    async fn invoke(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolOutput>;

    /// Release the connection. A second call is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Creates (uninitialized) sessions from configuration.
pub trait SessionFactory: Send + Sync {
    fn create(&self, config: &ServerConfig) -> Box<dyn ToolSession>;
}

type ReleaseAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Ordered release actions, run last-in first-out.
///
/// # Examples
///
/// ```
/// use mcp_relay::mcp::session::ReleaseStack;
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut stack = ReleaseStack::new();
/// stack.push("first", || async { Ok(()) });
/// stack.push("second", || async { Err(anyhow::anyhow!("stuck")) });
///
/// let failures = stack.unwind().await;
/// assert_eq!(failures.len(), 1);
/// assert_eq!(failures[0].0, "second");
/// assert!(stack.is_empty());
/// # }
/// ```
#[derive(Default)]
pub struct ReleaseStack {
    actions: Vec<(&'static str, ReleaseAction)>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the release for a resource that was just acquired.
    pub fn push<F, Fut>(&mut self, label: &'static str, action: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action: ReleaseAction = Box::new(move || action().boxed());
        self.actions.push((label, action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in reverse push order.
    ///
    /// A failing action does not stop the rest. Returns `(label, error)` for
    /// each failure. The stack is empty afterwards.
    pub async fn unwind(&mut self) -> Vec<(&'static str, anyhow::Error)> {
        let mut failures = Vec::new();
        while let Some((label, action)) = self.actions.pop() {
            if let Err(e) = action().await {
                failures.push((label, e));
            }
        }
        failures
    }
}

impl fmt::Debug for ReleaseStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|(label, _)| label))
            .finish()
    }
}

/// MCP session over a child process's stdio.
#[derive(Debug)]
pub struct StdioSession {
    config: ServerConfig,
    client_info: Implementation,
    request_timeout: Duration,
    init_timeout: Duration,
    state: SessionState,
    protocol: Option<InitializedMcpProtocol>,
    transport: Option<Arc<dyn Transport>>,
    release: ReleaseStack,
    /// Stops the I/O tasks if the session is dropped without `close`.
    _cancel_on_drop: Option<DropGuard>,
    #[cfg(test)]
    preset_transport: Option<Arc<dyn Transport>>,
}

impl StdioSession {
    pub fn new(
        config: ServerConfig,
        client_info: Implementation,
        request_timeout: Duration,
        init_timeout: Duration,
    ) -> Self {
        Self {
            config,
            client_info,
            request_timeout,
            init_timeout,
            state: SessionState::Uninitialized,
            protocol: None,
            transport: None,
            release: ReleaseStack::new(),
            _cancel_on_drop: None,
            #[cfg(test)]
            preset_transport: None,
        }
    }

    fn launch(&mut self) -> Result<Arc<dyn Transport>> {
        #[cfg(test)]
        if let Some(transport) = self.preset_transport.take() {
            return Ok(transport);
        }
        let transport = StdioTransport::spawn(
            PathBuf::from(&self.config.command),
            self.config.args.clone(),
            self.config.env.clone(),
            self.config.cwd.clone(),
        )?;
        Ok(Arc::new(transport))
    }

    async fn connect(&mut self) -> Result<InitializedMcpProtocol> {
        let transport = self.launch()?;
        self.transport = Some(Arc::clone(&transport));
        {
            let transport = Arc::clone(&transport);
            self.release
                .push("transport", move || async move { transport.close().await });
        }

        let token = CancellationToken::new();
        self._cancel_on_drop = Some(token.clone().drop_guard());

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let writer = {
            let transport = Arc::clone(&transport);
            let token = token.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        msg = out_rx.recv() => {
                            let Some(msg) = msg else { break };
                            if transport.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let reader = {
            let transport = Arc::clone(&transport);
            let token = token.clone();
            tokio::spawn(async move {
                let mut inbound = transport.receive();
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        msg = inbound.next() => {
                            let Some(msg) = msg else { break };
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let client = Arc::new(
            JsonRpcClient::new(self.config.name.clone(), out_tx)
                .with_default_timeout(self.request_timeout),
        );
        let read_loop = start_read_loop(in_rx, token.clone(), Arc::clone(&client));

        self.release.push("io tasks", move || async move {
            token.cancel();
            for task in [writer, reader, read_loop] {
                let _ = task.await;
            }
            Ok(())
        });

        McpProtocol::new(client.clone_shared())
            .initialize(
                self.client_info.clone(),
                ClientCapabilities::default(),
                Some(self.init_timeout),
            )
            .await
    }

    async fn release_all(&mut self) -> Vec<(&'static str, anyhow::Error)> {
        self.protocol = None;
        let failures = self.release.unwind().await;
        self.transport = None;
        self._cancel_on_drop = None;
        self.state = SessionState::Closed;
        failures
    }

    fn not_ready(&self) -> RelayError {
        RelayError::SessionState {
            server: self.config.name.clone(),
            state: self.state.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ToolSession for StdioSession {
    fn server_name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(self.not_ready().into());
        }

        match self.connect().await {
            Ok(protocol) => {
                tracing::info!(
                    server = %self.config.name,
                    server_name = %protocol.initialize_response().server_info.name,
                    protocol_version = %protocol.initialize_response().protocol_version,
                    tools = protocol.has_tools(),
                    "Connected to MCP server"
                );
                self.protocol = Some(protocol);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                let transport = self.transport.clone();
                for (label, failure) in self.release_all().await {
                    tracing::warn!(
                        server = %self.config.name,
                        resource = label,
                        "Release after failed initialize: {}",
                        failure
                    );
                }

                let stderr = transport.map(|t| t.diagnostics()).unwrap_or_default();
                let mut reason = e.to_string();
                if !stderr.is_empty() {
                    reason = format!("{}; stderr: {}", reason, stderr.join(" | "));
                }
                Err(RelayError::Connection {
                    server: self.config.name.clone(),
                    reason,
                }
                .into())
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let protocol = self.protocol.as_ref().ok_or_else(|| self.not_ready())?;
        protocol.list_tools().await
    }

    async fn invoke(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolOutput> {
        let invocation_error = |cause: String| RelayError::ToolInvocation {
            tool: tool.to_string(),
            cause,
        };

        let protocol = self
            .protocol
            .as_ref()
            .ok_or_else(|| invocation_error(self.not_ready().to_string()))?;

        let arguments = (!arguments.is_null()).then_some(arguments);
        tracing::debug!(server = %self.config.name, tool, "tools/call");
        let response = protocol
            .call_tool(tool, arguments)
            .await
            .map_err(|e| invocation_error(e.to_string()))?;

        Ok(ToolOutput {
            content: serde_json::Value::Array(response.content),
            is_error: response.is_error.unwrap_or(false),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let failures = self.release_all().await;
        tracing::debug!(server = %self.config.name, "MCP session closed");
        if failures.is_empty() {
            return Ok(());
        }
        let detail = failures
            .iter()
            .map(|(label, e)| format!("{}: {}", label, e))
            .collect::<Vec<_>>()
            .join("; ");
        Err(RelayError::McpTransport(detail).into())
    }
}

/// Builds [`StdioSession`]s with shared client settings.
#[derive(Debug, Clone)]
pub struct StdioSessionFactory {
    client_info: Implementation,
    request_timeout: Duration,
    init_timeout: Duration,
}

impl StdioSessionFactory {
    pub fn new(request_timeout: Duration, init_timeout: Duration) -> Self {
        Self {
            client_info: Implementation::relay(),
            request_timeout,
            init_timeout,
        }
    }
}

impl SessionFactory for StdioSessionFactory {
    fn create(&self, config: &ServerConfig) -> Box<dyn ToolSession> {
        Box::new(StdioSession::new(
            config.clone(),
            self.client_info.clone(),
            self.request_timeout,
            self.init_timeout,
        ))
    }
}
