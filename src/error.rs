//! Error types for mcp-relay
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for mcp-relay operations
///
/// Only [`RelayError::Connection`] (server bring-up) and
/// [`RelayError::ModelEndpoint`] ever escape a conversation. Per-tool faults
/// are converted into conversation content by the dispatcher.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool server session could not be established
    #[error("Failed to connect to MCP server '{server}': {reason}")]
    Connection {
        /// Name of the server that failed to come up
        server: String,
        /// Underlying cause
        reason: String,
    },

    /// A single tool call failed
    #[error("Tool '{tool}' failed: {cause}")]
    ToolInvocation {
        /// Name of the tool that was invoked
        tool: String,
        /// Underlying cause
        cause: String,
    },

    /// The requested tool is not present in the catalog
    #[error("Tool {0} not found in any server")]
    ToolNotFound(String),

    /// The model endpoint call failed
    #[error("Model endpoint error: {0}")]
    ModelEndpoint(String),

    /// Two servers advertise the same tool name; the later one is dropped
    #[error("Tool '{tool}' from server '{dropped_server}' is shadowed by server '{kept_server}'")]
    DuplicateToolName {
        /// The duplicated tool name
        tool: String,
        /// Server whose registration won
        kept_server: String,
        /// Server whose registration was dropped
        dropped_server: String,
    },

    /// MCP transport failure (process spawn, closed pipes)
    #[error("MCP transport error: {0}")]
    McpTransport(String),

    /// An MCP request did not receive a response in time
    #[error("MCP timeout: server '{server}' did not answer '{method}'")]
    McpTimeout {
        /// Server the request was sent to
        server: String,
        /// JSON-RPC method name
        method: String,
    },

    /// The server answered with a JSON-RPC error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// The server selected a protocol revision we do not speak
    #[error("MCP protocol version mismatch: expected one of {expected:?}, got {got}")]
    McpProtocolVersion {
        /// Versions this client accepts
        expected: Vec<String>,
        /// Version the server selected
        got: String,
    },

    /// An operation was attempted in the wrong session lifecycle state
    #[error("Session for server '{server}' is {state}")]
    SessionState {
        /// Server name
        server: String,
        /// Current state of the session
        state: String,
    },

    /// One or more sessions failed to close during teardown
    #[error("Teardown failed for {} server(s): {}", .failures.len(), format_failures(.failures))]
    Teardown {
        /// `(server, error message)` pairs, in configuration order
        failures: Vec<(String, String)>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(server, message)| format!("{}: {}", server, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for mcp-relay operations
///
/// Uses `anyhow::Error` so callers can attach context; match on
/// [`RelayError`] with `downcast_ref` where the variant matters.
pub type Result<T> = anyhow::Result<T>;
