/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`: interactive chat, one conversation per line
- `run`: execute a single prompt
- `tools`: start the servers and list their tools

Every handler starts an [`Orchestrator`] from the loaded config and shuts it
down before returning, whether or not the command itself succeeded.
*/

use crate::agent::{ConversationOutcome, DriverSettings, StopReason};
use crate::config::Config;
use crate::error::Result;
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::session::StdioSessionFactory;
use crate::orchestrator::Orchestrator;
use crate::providers::create_provider;
use colored::Colorize;

/// Build the provider and bring every configured server up.
///
/// # Errors
///
/// Returns configuration errors, and a connection error if any server fails
/// to start (nothing is left running in that case).
pub async fn start_orchestrator(config: &Config) -> Result<Orchestrator> {
    let servers = config.mcp.resolve_servers()?;
    if servers.is_empty() {
        tracing::warn!("No MCP servers configured; the model will have no tools");
    }

    let provider = create_provider(&config.provider)?;
    let settings = DriverSettings {
        model: config.provider.anthropic.model.clone(),
        max_tokens: config.provider.anthropic.max_tokens,
        max_iterations: config.agent.max_iterations,
        system_prompt: config.system_prompt()?,
    };
    let factory = StdioSessionFactory::new(config.mcp.request_timeout(), config.mcp.init_timeout());

    Orchestrator::start(&servers, &factory, provider, settings).await
}

/// Shut down after `result`, keeping the command's error if both fail.
async fn finish<T>(mut orchestrator: Orchestrator, result: Result<T>) -> Result<T> {
    let shutdown = orchestrator.shutdown().await;
    match (result, shutdown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), shutdown) => {
            if let Err(teardown) = shutdown {
                tracing::warn!("Shutdown failed after command error: {}", teardown);
            }
            Err(e)
        }
    }
}

/// Human-readable answer: the final assistant text, plus a note on cap exhaustion.
pub fn render_answer(outcome: &ConversationOutcome, max_iterations: usize) -> String {
    let mut text = outcome.final_text();
    if outcome.stop_reason == StopReason::IterationCapReached {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "[stopped after {} tool round-trips; the model still wanted to call tools]",
            max_iterations
        ));
    }
    text
}

/// Catalog listing, as a table or JSON.
///
/// # Errors
///
/// Returns a serialization error for JSON output.
pub fn render_catalog(catalog: &ToolCatalog, json: bool) -> Result<String> {
    if json {
        let value = serde_json::json!({
            "tools": catalog.snapshot(),
            "dropped_duplicates": catalog.dropped_duplicates(),
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut out = String::new();
    if catalog.is_empty() {
        out.push_str("No tools available.\n");
    }
    for tool in catalog.snapshot() {
        out.push_str(&format!(
            "{} [{}]\n    {}\n",
            tool.name.bold(),
            tool.server.cyan(),
            tool.description
        ));
    }
    for dup in catalog.dropped_duplicates() {
        out.push_str(&format!(
            "{} '{}' from '{}' is hidden by '{}'\n",
            "duplicate:".yellow(),
            dup.tool,
            dup.dropped_server,
            dup.kept_server
        ));
    }
    Ok(out)
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Each input line runs one independent conversation; history does not
    //! carry over between lines.

    use super::*;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Errors
    ///
    /// Returns startup errors and teardown failures. Per-line errors are
    /// printed and the loop continues.
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat mode");
        let orchestrator = start_orchestrator(&config).await?;
        let result = chat_loop(&orchestrator).await;
        finish(orchestrator, result).await
    }

    async fn chat_loop(orchestrator: &Orchestrator) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(orchestrator);

        loop {
            match rl.readline(&format!("{} ", "relay>".green())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if is_exit(trimmed) {
                        break;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match orchestrator.run_conversation(trimmed).await {
                        Ok(outcome) => {
                            let answer =
                                render_answer(&outcome, orchestrator.settings().max_iterations);
                            println!("\n{}\n", answer);
                        }
                        Err(e) => {
                            eprintln!("{} {}\n", "Error:".red(), e);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Whether a line ends the chat.
    pub fn is_exit(line: &str) -> bool {
        matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit")
    }

    fn print_welcome_banner(orchestrator: &Orchestrator) {
        let servers = orchestrator.registry().names().join(", ");
        println!("\n{}", "mcp-relay interactive chat".bold());
        println!(
            "Model: {}  Servers: {}  Tools: {}",
            orchestrator.settings().model.cyan(),
            if servers.is_empty() { "none".to_string() } else { servers },
            orchestrator.catalog().len()
        );
        println!("Type 'exit' or 'quit' to leave\n");
    }

}

// Run command handler
pub mod run {
    //! One-shot prompt execution.

    use super::*;

    /// Run a single prompt and print the result
    ///
    /// # Errors
    ///
    /// Returns startup, model endpoint and teardown errors.
    pub async fn run_prompt(config: Config, prompt: String, json: bool) -> Result<()> {
        tracing::info!("Running single prompt");
        let orchestrator = start_orchestrator(&config).await?;
        let result = orchestrator.run_conversation(&prompt).await;
        let max_iterations = orchestrator.settings().max_iterations;
        let outcome = finish(orchestrator, result).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            println!("{}", render_answer(&outcome, max_iterations));
        }
        Ok(())
    }
}

// Tools command handler
pub mod tools {
    //! Catalog listing.

    use super::*;

    /// Start the servers, print the tool catalog and shut down
    ///
    /// # Errors
    ///
    /// Returns startup and teardown errors.
    pub async fn list_tools(config: Config, json: bool) -> Result<()> {
        let orchestrator = start_orchestrator(&config).await?;
        let rendered = render_catalog(orchestrator.catalog(), json);
        let rendered = finish(orchestrator, rendered).await?;
        print!("{}", rendered);
        Ok(())
    }
}
