//! CLI module for the broker operator tool.
//!
//! This module provides the command-line interface for inspecting broker
//! configuration and deployment records.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::{OutputFormatter, WorkspaceSummary};
