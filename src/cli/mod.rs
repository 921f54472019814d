//! Command-line interface for the routing workflow

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, ConfigCommands};
