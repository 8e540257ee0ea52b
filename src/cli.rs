//! Command-line interface definition for mcp-relay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot runs and tool listing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// mcp-relay - drive a model through MCP tool servers
///
/// Launches the configured MCP servers over stdio, gathers their tools and
/// lets the model call them until it has an answer.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcp-relay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat; each line runs one conversation
    Chat {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run a single prompt and print the answer
    Run {
        /// Prompt to send to the model
        #[arg(short, long)]
        prompt: String,

        /// Print the full conversation history as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Start the servers, list their tools and shut down
    Tools {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Config overrides shared by every command
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// JSON file with an `mcpServers` mapping
    #[arg(long)]
    pub servers_file: Option<PathBuf>,

    /// Model id to request
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum tool round-trips per conversation
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Overrides of whichever command was given.
    pub fn overrides(&self) -> &Overrides {
        match &self.command {
            Commands::Chat { overrides }
            | Commands::Run { overrides, .. }
            | Commands::Tools { overrides, .. } => overrides,
        }
    }
}
