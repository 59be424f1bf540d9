//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tfbroker - Terraform-backed service broker operator tool.
#[derive(Parser, Debug)]
#[command(name = "tfbroker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "TFBROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text", env = "TFBROKER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the broker configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Classify an update request as an update or an upgrade.
    Decide {
        /// Catalog file listing the service offerings (YAML or JSON).
        #[arg(long)]
        catalog: PathBuf,

        /// Update request file (JSON).
        #[arg(long)]
        request: PathBuf,
    },

    /// Show the last operation of a deployment.
    Status {
        /// Deployment id, for example `tf:<instance>:`.
        id: String,
    },

    /// Block until the last operation of a deployment is done.
    Wait {
        /// Deployment id.
        id: String,

        /// Give up after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show the workspace stored for a deployment.
    Show {
        /// Deployment id.
        id: String,
    },

    /// List every stored deployment.
    Ids,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per log line.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wait() {
        let cli = Cli::try_parse_from(["tfbroker", "wait", "tf:inst:", "--timeout-secs", "30"])
            .expect("valid args");
        match cli.command {
            Commands::Wait { id, timeout_secs } => {
                assert_eq!(id, "tf:inst:");
                assert_eq!(timeout_secs, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "tfbroker",
            "ids",
            "--output",
            "json",
            "--log-format",
            "json",
            "-v",
        ])
        .expect("valid args");
        assert!(cli.verbose);
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn test_decide_requires_files() {
        assert!(Cli::try_parse_from(["tfbroker", "decide", "--catalog", "c.yaml"]).is_err());
    }
}
