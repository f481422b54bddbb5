//! CLI commands

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pepper-monitor - forwards robot telemetry to Fluentd
#[derive(Parser, Debug)]
#[command(name = "pepper-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (searched in the working directory and ~/.config/pepper-monitor if omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON snapshot file the metric values are read from
    #[arg(short, long, global = true, default_value = "telemetry.json")]
    pub source: PathBuf,

    /// Log records locally instead of sending them to Fluentd
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Emit diagnostic logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Seconds between config file change checks
    #[arg(long, global = true, default_value_t = 2)]
    pub watch_interval: u64,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the agent until interrupted (default)
    Run,

    /// Load the configuration and print it after normalization
    CheckConfig,
}

impl Cli {
    /// The subcommand to run, `run` when none was given.
    pub fn subcommand(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}
