//! mcp-relay - drive a model through MCP tool servers
//!
#![doc = "Main entry point for the mcp-relay application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_relay::cli::{Cli, Commands};
use mcp_relay::commands;
use mcp_relay::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { .. } => commands::chat::run_chat(config).await,
        Commands::Run { prompt, json, .. } => {
            tracing::debug!("Using prompt: {}", prompt);
            commands::run::run_prompt(config, prompt, json).await
        }
        Commands::Tools { json, .. } => commands::tools::list_tools(config, json).await,
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so stdout carries only conversation output.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "mcp_relay=debug"
    } else {
        "mcp_relay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
