//! Session orchestrator
//!
//! Brings the configured servers up, builds the tool catalog, runs
//! conversations against them and tears everything down again.

use std::sync::Arc;

use crate::agent::{ConversationDriver, ConversationOutcome, Dispatcher, DriverSettings};
use crate::error::Result;
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::config::ServerConfig;
use crate::mcp::registry::ServerRegistry;
use crate::mcp::session::SessionFactory;
use crate::providers::Provider;

/// Owns the registry, catalog and driver for the lifetime of a run.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mcp_relay::agent::DriverSettings;
/// use mcp_relay::mcp::config::ServerConfig;
/// use mcp_relay::mcp::session::StdioSessionFactory;
/// use mcp_relay::orchestrator::Orchestrator;
/// use mcp_relay::providers::Provider;
///
/// # async fn example(provider: Arc<dyn Provider>) -> mcp_relay::error::Result<()> {
/// let servers = vec![ServerConfig::new("utils", "uv").with_args(["run", "server.py"])];
/// let settings = DriverSettings {
///     model: "claude-3-7-sonnet-20250219".to_string(),
///     max_tokens: 4096,
///     max_iterations: 10,
///     system_prompt: String::new(),
/// };
/// let factory = StdioSessionFactory::new(Duration::from_secs(30), Duration::from_secs(30));
///
/// let mut orchestrator = Orchestrator::start(&servers, &factory, provider, settings).await?;
/// let outcome = orchestrator.run_conversation("Read a.txt").await;
/// orchestrator.shutdown().await?;
/// println!("{}", outcome?.final_text());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    registry: ServerRegistry,
    catalog: ToolCatalog,
    driver: ConversationDriver,
}

impl Orchestrator {
    /// Bring up every server and build the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::Config`] for invalid settings and
    /// [`crate::error::RelayError::Connection`] if a server cannot be started
    /// or listed. No server is left running on error.
    pub async fn start(
        servers: &[ServerConfig],
        factory: &dyn SessionFactory,
        provider: Arc<dyn Provider>,
        settings: DriverSettings,
    ) -> Result<Self> {
        let driver = ConversationDriver::new(provider, settings)?;
        let mut registry = ServerRegistry::bring_up(servers, factory).await?;

        let catalog = match ToolCatalog::build(&registry).await {
            Ok(catalog) => catalog,
            Err(e) => {
                if let Err(teardown) = registry.teardown().await {
                    tracing::warn!("Teardown after catalog failure: {}", teardown);
                }
                return Err(e);
            }
        };

        Ok(Self {
            registry,
            catalog,
            driver,
        })
    }

    /// Run one conversation. History does not carry over between calls.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::ModelEndpoint`] if the model call
    /// fails.
    pub async fn run_conversation(&self, user_text: &str) -> Result<ConversationOutcome> {
        let dispatcher = Dispatcher::new(&self.catalog, &self.registry);
        self.driver.run(user_text, &self.catalog, &dispatcher).await
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DriverSettings {
        self.driver.settings()
    }

    /// Close every server session. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RelayError::Teardown`] listing the sessions
    /// that failed to close.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.registry.teardown().await
    }
}
