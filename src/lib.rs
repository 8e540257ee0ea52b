//! mcp-relay - MCP session orchestrator library
//!
//! This library launches MCP tool servers over stdio, merges their tools into
//! one catalog and runs a bounded model/tool conversation loop over them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: transport sessions, server registry and tool catalog
//! - `agent`: conversation driver and tool dispatcher
//! - `providers`: model endpoint abstraction and the Anthropic client
//! - `orchestrator`: wires the above together
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use mcp_relay::cli::Cli;
//! use mcp_relay::commands::start_orchestrator;
//! use mcp_relay::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse_args();
//!     let config = Config::load("config/config.yaml", &cli)?;
//!     config.validate()?;
//!
//!     let mut orchestrator = start_orchestrator(&config).await?;
//!     let outcome = orchestrator.run_conversation("What tools do you have?").await;
//!     orchestrator.shutdown().await?;
//!     println!("{}", outcome?.final_text());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod providers;

// Re-export commonly used types
pub use agent::{ConversationOutcome, StopReason};
pub use config::Config;
pub use error::{RelayError, Result};
pub use orchestrator::Orchestrator;

#[cfg(test)]
pub mod test_utils;
