//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Local CI trigger and containerized test runner
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-runner")]
#[command(author = "ci-runner Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Decides whether a repository event triggers a run, then checks out, builds and tests in a container", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to workflow configuration file (built-in default when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Stream build and test output as it is produced
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Evaluate the trigger policy and, if triggered, execute the run
    Run(RunCommand),

    /// Only evaluate the trigger policy (exit 78 when the run would be skipped)
    Check(CheckCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// List workflows in the run history
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
