//! # Parla Workflow CLI
//!
//! Runs the deadline monitor for the legislative routing workflow and exposes
//! a few maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! # Sweep on the configured interval until Ctrl-C
//! parla-wf serve
//!
//! # One-off sweep, optionally as of a given instant
//! parla-wf sweep --at 2024-03-01T12:00:00Z --json
//!
//! # Inspect or create the configuration file
//! parla-wf config show
//! parla-wf config init
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use clap::Parser;
use parla::{
    cli::{Cli, Commands, commands},
    domain::error::WorkflowError
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), WorkflowError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let explicit = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve => commands::handle_serve_command(explicit, cli.store).await,
        Commands::Sweep { at, json } => commands::handle_sweep_command(explicit, cli.store, at, json).await,
        Commands::Config { command } => commands::handle_config_command(&command, explicit)
    };

    result.map_err(|e| WorkflowError::Generic(format!("{:#}", e)))
}
