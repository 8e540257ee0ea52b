//! Typed MCP lifecycle wrapper over [`JsonRpcClient`]
//!
//! Two types model the two phases of a client connection:
//!
//! - [`McpProtocol`]: not yet negotiated. [`McpProtocol::initialize`] performs
//!   the `initialize` / `notifications/initialized` handshake.
//! - [`InitializedMcpProtocol`]: negotiated. Tool discovery and tool calls
//!   are available as typed async methods.
//!
//! Neither type owns a transport; the session layer wires channels and passes
//! the resulting [`JsonRpcClient`] in.

use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::mcp::client::JsonRpcClient;
use crate::mcp::types::{
    CallToolParams, CallToolResponse, ClientCapabilities, Implementation, InitializeParams,
    InitializeResponse, ListToolsResponse, McpTool, PaginatedParams, LATEST_PROTOCOL_VERSION,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Upper bound on `tools/list` pages, against servers that loop their cursor.
const MAX_TOOL_PAGES: usize = 100;

/// An MCP client that has not completed the handshake.
#[derive(Debug)]
pub struct McpProtocol {
    client: JsonRpcClient,
}

impl McpProtocol {
    /// Wrap a channel-wired [`JsonRpcClient`] whose read loop is running.
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }

    /// Perform the MCP handshake.
    ///
    /// Sends `initialize`, verifies the server picked a revision listed in
    /// [`SUPPORTED_PROTOCOL_VERSIONS`], then sends
    /// `notifications/initialized`.
    ///
    /// # Arguments
    ///
    /// * `client_info` - Name and version of this client.
    /// * `capabilities` - Capabilities this client advertises.
    /// * `timeout` - Optional deadline for the `initialize` response.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::McpProtocolVersion`] on an unsupported revision,
    /// and propagates transport and timeout errors from the client.
    pub async fn initialize(
        self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        timeout: Option<Duration>,
    ) -> Result<InitializedMcpProtocol> {
        let response: InitializeResponse = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities,
                    client_info,
                },
                timeout,
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(RelayError::McpProtocolVersion {
                expected: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            }
            .into());
        }

        self.client
            .notify(METHOD_INITIALIZED, serde_json::json!({}))?;

        tracing::debug!(
            server = self.client.server(),
            protocol_version = %response.protocol_version,
            server_name = %response.server_info.name,
            "MCP handshake complete"
        );

        Ok(InitializedMcpProtocol {
            client: self.client,
            initialize_response: response,
        })
    }
}

/// A negotiated MCP client connection.
#[derive(Debug)]
pub struct InitializedMcpProtocol {
    client: JsonRpcClient,
    initialize_response: InitializeResponse,
}

impl InitializedMcpProtocol {
    /// The server's answer to `initialize`.
    pub fn initialize_response(&self) -> &InitializeResponse {
        &self.initialize_response
    }

    /// Whether the server advertised the `tools` capability.
    pub fn has_tools(&self) -> bool {
        self.initialize_response.capabilities.tools.is_some()
    }

    /// List all tools advertised by the server, following `nextCursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails or the server keeps
    /// returning cursors past the page limit.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let resp: ListToolsResponse = self
                .client
                .request(METHOD_TOOLS_LIST, PaginatedParams { cursor }, None)
                .await?;

            tools.extend(resp.tools);

            match resp.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => return Ok(tools),
            }
        }

        Err(RelayError::Mcp(format!(
            "server '{}' returned more than {} pages of tools",
            self.client.server(),
            MAX_TOOL_PAGES
        ))
        .into())
    }

    /// Invoke a named tool on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns a JSON-RPC
    /// error. A tool-level failure (`isError: true`) is a successful response.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResponse> {
        self.client
            .request(
                METHOD_TOOLS_CALL,
                CallToolParams {
                    name: name.to_string(),
                    arguments,
                },
                None,
            )
            .await
    }
}
