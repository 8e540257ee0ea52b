//! Tool catalog: every server's tools in one namespace
//!
//! The first server (in configuration order) to advertise a tool name owns
//! it. Later servers advertising the same name are recorded as
//! [`DroppedDuplicate`]s and logged; their copy is never reachable.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{RelayError, Result};
use crate::mcp::registry::ServerRegistry;
use crate::mcp::session::SessionState;
use crate::mcp::types::McpTool;

/// A tool as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    /// Owning server name.
    pub server: String,
}

/// A tool advertisement that lost to an earlier server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedDuplicate {
    pub tool: String,
    pub kept_server: String,
    pub dropped_server: String,
}

/// Read-only, deduplicated view of all advertised tools.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    dropped: Vec<DroppedDuplicate>,
}

impl ToolCatalog {
    /// Query every ready session for its tools, in registry order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] naming the first server whose
    /// `tools/list` fails.
    pub async fn build(registry: &ServerRegistry) -> Result<Self> {
        let mut advertised = Vec::with_capacity(registry.len());
        for session in registry.sessions() {
            if session.state() != SessionState::Ready {
                continue;
            }
            let tools = session.list_tools().await.map_err(|e| RelayError::Connection {
                server: session.server_name().to_string(),
                reason: format!("tools/list failed: {}", e),
            })?;
            tracing::debug!(server = %session.server_name(), count = tools.len(), "Discovered tools");
            advertised.push((session.server_name().to_string(), tools));
        }

        let catalog = Self::from_advertised(advertised);
        tracing::info!(
            tools = catalog.len(),
            dropped = catalog.dropped.len(),
            "Tool catalog built"
        );
        Ok(catalog)
    }

    /// Build from `(server, tools)` pairs already in precedence order.
    pub fn from_advertised<I>(advertised: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<McpTool>)>,
    {
        let mut catalog = Self::default();
        for (server, tools) in advertised {
            for tool in tools {
                catalog.register(&server, tool);
            }
        }
        catalog
    }

    fn register(&mut self, server: &str, tool: McpTool) {
        if let Some(&existing) = self.index.get(&tool.name) {
            let duplicate = DroppedDuplicate {
                tool: tool.name,
                kept_server: self.tools[existing].server.clone(),
                dropped_server: server.to_string(),
            };
            tracing::warn!(
                "{}",
                RelayError::DuplicateToolName {
                    tool: duplicate.tool.clone(),
                    kept_server: duplicate.kept_server.clone(),
                    dropped_server: duplicate.dropped_server.clone(),
                }
            );
            self.dropped.push(duplicate);
            return;
        }

        let description = tool
            .description
            .or(tool.title)
            .unwrap_or_default();
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(ToolDescriptor {
            name: tool.name,
            description,
            input_schema: tool.input_schema,
            server: server.to_string(),
        });
    }

    /// Owning server for a tool name.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name).map(|t| t.server.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Tools in registration order.
    pub fn snapshot(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn dropped_duplicates(&self) -> &[DroppedDuplicate] {
        &self.dropped
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
