//! Server registry: owns every live session, keyed by server name
//!
//! Bring-up is sequential and all-or-nothing. Teardown closes every session
//! concurrently and reports all failures together.

use futures::future::join_all;

use crate::error::{RelayError, Result};
use crate::mcp::config::ServerConfig;
use crate::mcp::session::{SessionFactory, ToolSession};

/// Live tool-server sessions in configuration order.
#[derive(Debug)]
pub struct ServerRegistry {
    sessions: Vec<Box<dyn ToolSession>>,
    torn_down: bool,
}

impl ServerRegistry {
    /// Create and initialize one session per config, in order.
    ///
    /// If any server fails to come up, the servers already started are closed
    /// in reverse order before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if two configs share a name, and
    /// [`RelayError::Connection`] for the first server that fails.
    pub async fn bring_up(configs: &[ServerConfig], factory: &dyn SessionFactory) -> Result<Self> {
        for (i, config) in configs.iter().enumerate() {
            if configs[..i].iter().any(|c| c.name == config.name) {
                return Err(RelayError::Config(format!(
                    "MCP server '{}' is declared more than once",
                    config.name
                ))
                .into());
            }
        }

        let mut registry = Self {
            sessions: Vec::with_capacity(configs.len()),
            torn_down: false,
        };

        for config in configs {
            let mut session = factory.create(config);
            tracing::debug!(server = %config.name, command = %config.command, "Starting MCP server");

            if let Err(e) = session.initialize().await {
                tracing::warn!(
                    server = %config.name,
                    started = registry.sessions.len(),
                    "MCP server failed to start; rolling back"
                );
                registry.rollback().await;

                let is_connection = matches!(
                    e.downcast_ref::<RelayError>(),
                    Some(RelayError::Connection { .. })
                );
                if is_connection {
                    return Err(e);
                }
                return Err(RelayError::Connection {
                    server: config.name.clone(),
                    reason: e.to_string(),
                }
                .into());
            }

            registry.sessions.push(session);
        }

        tracing::info!(servers = registry.sessions.len(), "MCP servers ready");
        Ok(registry)
    }

    /// Close started sessions newest first. Failures are logged only.
    async fn rollback(&mut self) {
        self.torn_down = true;
        while let Some(mut session) = self.sessions.pop() {
            if let Err(e) = session.close().await {
                tracing::warn!(
                    server = %session.server_name(),
                    "Failed to close MCP server during rollback: {}",
                    e
                );
            }
        }
    }

    /// Session for a server name.
    pub fn session(&self, name: &str) -> Option<&dyn ToolSession> {
        self.sessions
            .iter()
            .find(|s| s.server_name() == name)
            .map(|s| s.as_ref())
    }

    /// All sessions in configuration order.
    pub fn sessions(&self) -> impl Iterator<Item = &dyn ToolSession> {
        self.sessions.iter().map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.sessions.iter().map(|s| s.server_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session concurrently and wait for all of them.
    ///
    /// Only the first call does anything.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Teardown`] listing every session whose close
    /// failed, in configuration order.
    pub async fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let results = join_all(self.sessions.iter_mut().map(|session| async move {
            let server = session.server_name().to_string();
            (server, session.close().await)
        }))
        .await;

        let failures: Vec<(String, String)> = results
            .into_iter()
            .filter_map(|(server, result)| result.err().map(|e| (server, e.to_string())))
            .collect();

        for (server, message) in &failures {
            tracing::warn!(server = %server, "Failed to close MCP server: {}", message);
        }

        if failures.is_empty() {
            tracing::debug!(servers = self.sessions.len(), "MCP servers shut down");
            Ok(())
        } else {
            Err(RelayError::Teardown { failures }.into())
        }
    }
}

impl Drop for ServerRegistry {
    fn drop(&mut self) {
        if !self.torn_down && !self.sessions.is_empty() {
            tracing::warn!(
                servers = self.sessions.len(),
                "Server registry dropped without teardown; child processes get SIGTERM only"
            );
        }
    }
}
