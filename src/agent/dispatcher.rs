//! Tool-call dispatch
//!
//! Routes each tool-use request to the session that owns the tool. Every
//! outcome, including failures, comes back as a [`ToolResultBlock`]; nothing
//! here returns an error to the conversation loop.

use crate::error::RelayError;
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::registry::ServerRegistry;
use crate::providers::{ToolResultBlock, ToolUseRequest};

/// Resolves tools through the catalog and invokes them on the registry.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    catalog: &'a ToolCatalog,
    registry: &'a ServerRegistry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(catalog: &'a ToolCatalog, registry: &'a ServerRegistry) -> Self {
        Self { catalog, registry }
    }

    /// Execute one request. The result's `tool_use_id` is the request's id.
    pub async fn dispatch(&self, request: &ToolUseRequest) -> ToolResultBlock {
        let Some(server) = self.catalog.resolve(&request.name) else {
            tracing::debug!(tool = %request.name, "Model requested an unknown tool");
            return ToolResultBlock::error(
                &request.id,
                format!("Error: {}", RelayError::ToolNotFound(request.name.clone())),
            );
        };

        let Some(session) = self.registry.session(server) else {
            return ToolResultBlock::error(
                &request.id,
                format!("Error: server '{}' is not running", server),
            );
        };

        tracing::debug!(tool = %request.name, server = %server, id = %request.id, "Dispatching tool call");
        match session.invoke(&request.name, request.arguments.clone()).await {
            Ok(output) => ToolResultBlock::output(&request.id, output),
            Err(e) => {
                let message = match e.downcast_ref::<RelayError>() {
                    Some(RelayError::ToolInvocation { cause, .. }) => cause.clone(),
                    _ => e.to_string(),
                };
                tracing::warn!(tool = %request.name, server = %server, "Tool call failed: {}", message);
                ToolResultBlock::error(&request.id, format!("Error: {}", message))
            }
        }
    }

    /// Execute requests one at a time, left to right. One result per request,
    /// in request order.
    pub async fn dispatch_all(&self, requests: &[ToolUseRequest]) -> Vec<ToolResultBlock> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.dispatch(request).await);
        }
        results
    }
}
