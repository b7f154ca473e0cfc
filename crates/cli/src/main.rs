//! agentloop CLI: the main entry point.
//!
//! Commands:
//! - `check` : Validate configuration and the plugin registry
//! - `tools` : List the tools the loop would offer the LLM
//! - `replay`: Run the loop against a scripted LLM and print its events

use std::path::PathBuf;

use agentloop_config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "agentloop: tool-calling agent loop runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.agentloop/config.toml
    #[arg(short, long, global = true, env = "AGENTLOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and plugin health
    Check,

    /// List registered tools
    Tools {
        /// Print full tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted LLM conversation through the loop
    Replay {
        /// JSON file holding an array of LLM responses
        script: PathBuf,

        /// The user message that starts the run
        #[arg(short, long)]
        message: String,

        /// Override agent.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Deliver scripted content through chunk events
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Check => commands::check::run(&config).await?,
        Commands::Tools { json } => commands::tools::run(&config, json).await?,
        Commands::Replay {
            script,
            message,
            max_iterations,
            stream,
        } => commands::replay::run(&config, &script, &message, max_iterations, stream).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` means debug, else the configured level.
fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Logs go to stderr; stdout carries command output.
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}
