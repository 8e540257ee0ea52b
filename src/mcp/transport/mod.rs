//! MCP transport abstraction and implementations
//!
//! - [`stdio::StdioTransport`] spawns a child process and talks to it over
//!   its stdin/stdout pipes (newline-delimited JSON).
//! - [`fake::FakeTransport`] is an in-process fake used in tests
//!   (`cfg(test)` only).
//!
//! The trait is minimal: callers `send` a serialized JSON-RPC string and
//! `receive` a stream of serialized JSON-RPC strings. Framing is the
//! responsibility of each implementation.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// Abstraction over MCP transport implementations.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a complete JSON-RPC message string to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::McpTransport`] if the underlying
    /// channel or pipe is closed.
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound JSON-RPC message strings, one complete JSON object
    /// per item. Ends when the peer disconnects.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Most recent diagnostic lines (stderr for child processes).
    ///
    /// Diagnostics are informational only and never an error condition.
    fn diagnostics(&self) -> Vec<String>;

    /// Shut the peer down and release the underlying handles.
    ///
    /// Calling `close` more than once is a no-op.
    async fn close(&self) -> Result<()>;
}

pub mod stdio;

#[cfg(test)]
pub mod fake;
