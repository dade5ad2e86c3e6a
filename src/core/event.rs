//! Repository event descriptor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind of repository event that may start a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch
    Push,
    /// Pull request activity
    PullRequest,
    /// Manual dispatch
    WorkflowDispatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::WorkflowDispatch => "workflow_dispatch",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "workflow_dispatch" => Ok(EventKind::WorkflowDispatch),
            other => Err(format!("Unknown event type: {}", other)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull request activity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrAction {
    Opened,
    Reopened,
    /// New commits pushed to the PR head
    Synchronize,
    Closed,
    Edited,
    /// Any other activity type, kept verbatim
    Other(String),
}

impl PrAction {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "opened" => PrAction::Opened,
            "reopened" => PrAction::Reopened,
            "synchronize" => PrAction::Synchronize,
            "closed" => PrAction::Closed,
            "edited" => PrAction::Edited,
            other => PrAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PrAction::Opened => "opened",
            PrAction::Reopened => "reopened",
            PrAction::Synchronize => "synchronize",
            PrAction::Closed => "closed",
            PrAction::Edited => "edited",
            PrAction::Other(s) => s,
        }
    }
}

impl fmt::Display for PrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PrAction::parse(s))
    }
}

impl Serialize for PrAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PrAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(PrAction::parse(&s))
    }
}

/// An event produced by the repository host, consumed once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Event type
    #[serde(rename = "event")]
    pub kind: EventKind,

    /// Branch or tag ref (e.g. `refs/heads/main`)
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,

    /// Commit the run should check out
    #[serde(default)]
    pub sha: Option<String>,

    /// Paths changed by the push, relative to the repository root
    #[serde(default)]
    pub changed_paths: Vec<String>,

    /// Pull request action (pull_request events only)
    #[serde(default)]
    pub action: Option<PrAction>,
}

impl EventDescriptor {
    pub fn push<I, S>(changed_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: EventKind::Push,
            git_ref: None,
            sha: None,
            changed_paths: changed_paths.into_iter().map(Into::into).collect(),
            action: None,
        }
    }

    pub fn pull_request(action: PrAction) -> Self {
        Self {
            kind: EventKind::PullRequest,
            git_ref: None,
            sha: None,
            changed_paths: Vec::new(),
            action: Some(action),
        }
    }

    pub fn dispatch() -> Self {
        Self {
            kind: EventKind::WorkflowDispatch,
            git_ref: None,
            sha: None,
            changed_paths: Vec::new(),
            action: None,
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Load an event from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The revision to check out: the commit if known, else the ref
    pub fn revision(&self) -> Option<&str> {
        self.sha.as_deref().or(self.git_ref.as_deref())
    }
}
