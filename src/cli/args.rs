//! CLI argument parsing

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::adapter::StoreType;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured storage backend
    #[arg(long, global = true, value_enum)]
    pub store: Option<StoreType>,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the deadline monitor until interrupted
    Serve,
    /// Run one deadline sweep and print the escalations
    Sweep {
        /// Evaluate deadlines as of this instant (RFC 3339) instead of now
        #[arg(long)]
        at:   Option<DateTime<Utc>>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool
    },
    /// Configuration management commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as YAML
    Show,
    /// Write the default configuration file if none exists
    Init,
    /// Print the configuration file path
    Path
}
