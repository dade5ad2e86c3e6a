//! CLI command definitions

use crate::core::{EventDescriptor, EventKind, PrAction};
use clap::Args;
use std::path::PathBuf;

/// Describes the triggering event(s)
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event type
    #[arg(long, value_enum, default_value_t = EventArg::WorkflowDispatch)]
    pub event: EventArg,

    /// Branch or tag ref (e.g. refs/heads/main)
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Commit to check out
    #[arg(long)]
    pub sha: Option<String>,

    /// Path changed by the push (repeatable)
    #[arg(long)]
    pub changed_path: Vec<String>,

    /// Pull request action (opened, reopened, synchronize, ...)
    #[arg(long)]
    pub pr_action: Option<String>,

    /// Compute changed paths with `git diff --name-only <base>...HEAD`
    #[arg(long)]
    pub diff_base: Option<String>,

    /// Load the event from a JSON file instead of flags (repeatable)
    #[arg(long)]
    pub event_file: Vec<PathBuf>,
}

impl EventArgs {
    /// The event described by the individual flags
    pub fn flag_event(&self) -> EventDescriptor {
        let mut event = match self.event {
            EventArg::Push => EventDescriptor::push(self.changed_path.iter().cloned()),
            EventArg::PullRequest => EventDescriptor {
                action: self.pr_action.as_deref().map(PrAction::parse),
                ..EventDescriptor::pull_request(PrAction::Opened)
            },
            EventArg::WorkflowDispatch => EventDescriptor::dispatch(),
        };
        event.git_ref = self.git_ref.clone();
        event.sha = self.sha.clone();
        event
    }
}

/// Run the workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub event: EventArgs,

    /// Repository to check out
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Use the repository directory itself instead of a fresh clone
    #[arg(long)]
    pub in_place: bool,

    /// Container CLI (docker or podman)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Image name (tagged per run)
    #[arg(long)]
    pub image: Option<String>,

    /// Keep the run's image after the run
    #[arg(long)]
    pub keep_image: bool,

    /// Fail before the build when a secret is unset or empty
    #[arg(long)]
    pub require_secrets: bool,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,

    /// Maximum number of runs executed at once
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
}

/// Evaluate the trigger policy only
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    #[command(flatten)]
    pub event: EventArgs,

    /// Repository used for --diff-base
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file (overrides --config)
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List workflows in the run history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Event type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    Push,
    PullRequest,
    WorkflowDispatch,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Push => EventKind::Push,
            EventArg::PullRequest => EventKind::PullRequest,
            EventArg::WorkflowDispatch => EventKind::WorkflowDispatch,
        }
    }
}
