//! Step domain model

use crate::core::state::StepState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The four stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Fetch repository contents at the triggering commit
    Checkout,
    /// Write secrets into the env file
    Secrets,
    /// Build the container image
    Build,
    /// Run the test command inside the container
    Test,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::Checkout,
        StepKind::Secrets,
        StepKind::Build,
        StepKind::Test,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StepKind::Checkout => "checkout",
            StepKind::Secrets => "secrets",
            StepKind::Build => "build",
            StepKind::Test => "test",
        }
    }

    /// Human-readable step name
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Checkout => "Checkout",
            StepKind::Secrets => "Write secrets",
            StepKind::Build => "Build image",
            StepKind::Test => "Run tests",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A single step in a run
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,

    /// No timeout when unset
    pub timeout_secs: Option<u64>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    pub fn new(kind: StepKind, timeout_secs: Option<u64>) -> Self {
        Self {
            kind,
            timeout_secs,
            state: StepState::Pending,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Output captured by a finished step
    pub fn output(&self) -> Option<&str> {
        match &self.state {
            StepState::Completed { output, .. } | StepState::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}
