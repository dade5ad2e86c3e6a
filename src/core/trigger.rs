//! Trigger policy - decides whether an event starts a run

use crate::core::config::TriggerConfig;
use crate::core::event::{EventDescriptor, EventKind, PrAction};
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use serde::Serialize;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled `paths-ignore` entry
///
/// A trailing `/**` also matches every path below the directory, whatever
/// the depth.
#[derive(Debug, Clone)]
struct IgnorePattern {
    pattern: Pattern,
    directory: Option<Pattern>,
}

impl IgnorePattern {
    fn new(raw: &str) -> Result<Self> {
        let pattern =
            Pattern::new(raw).with_context(|| format!("Invalid ignore pattern '{}'", raw))?;
        let directory = match raw.strip_suffix("/**") {
            Some(dir) if !dir.is_empty() => Some(
                Pattern::new(dir).with_context(|| format!("Invalid ignore pattern '{}'", raw))?,
            ),
            _ => None,
        };
        Ok(Self { pattern, directory })
    }

    fn matches(&self, path: &str) -> bool {
        if self.pattern.matches_with(path, MATCH_OPTIONS) {
            return true;
        }
        let Some(directory) = &self.directory else {
            return false;
        };
        path.match_indices('/')
            .any(|(idx, _)| directory.matches_with(&path[..idx], MATCH_OPTIONS))
    }
}

/// Outcome of evaluating an event against the trigger policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    /// The event starts a run
    Trigger { reason: String },
    /// The event is ignored
    Skip { reason: String },
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, TriggerDecision::Trigger { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            TriggerDecision::Trigger { reason } | TriggerDecision::Skip { reason } => reason,
        }
    }
}

/// Compiled trigger policy
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    push_enabled: bool,
    paths_ignore: Vec<IgnorePattern>,
    pull_request_enabled: bool,
    pull_request_actions: Vec<PrAction>,
    dispatch_enabled: bool,
}

impl TriggerPolicy {
    /// Compile a policy from configuration
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        let paths_ignore = match &config.push {
            Some(push) => push
                .paths_ignore
                .iter()
                .map(|p| IgnorePattern::new(p))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            push_enabled: config.push.is_some(),
            paths_ignore,
            pull_request_enabled: config.pull_request.is_some(),
            pull_request_actions: config
                .pull_request
                .as_ref()
                .map(|pr| pr.types.iter().map(|t| PrAction::parse(t)).collect())
                .unwrap_or_default(),
            dispatch_enabled: config.workflow_dispatch,
        })
    }

    /// Whether a single path matches the ignore list
    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        self.paths_ignore
            .iter()
            .any(|pattern| pattern.matches(path))
    }

    /// Evaluate an event
    pub fn evaluate(&self, event: &EventDescriptor) -> TriggerDecision {
        match event.kind {
            EventKind::Push => self.evaluate_push(event),
            EventKind::PullRequest => self.evaluate_pull_request(event),
            EventKind::WorkflowDispatch => {
                if self.dispatch_enabled {
                    TriggerDecision::Trigger {
                        reason: "manual dispatch".to_string(),
                    }
                } else {
                    TriggerDecision::Skip {
                        reason: "workflow_dispatch is not enabled".to_string(),
                    }
                }
            }
        }
    }

    fn evaluate_push(&self, event: &EventDescriptor) -> TriggerDecision {
        if !self.push_enabled {
            return TriggerDecision::Skip {
                reason: "push trigger is not enabled".to_string(),
            };
        }

        // An empty path list proves nothing about what changed
        if event.changed_paths.is_empty() {
            return TriggerDecision::Trigger {
                reason: "push with unknown changed paths".to_string(),
            };
        }

        match event.changed_paths.iter().find(|p| !self.is_ignored(p)) {
            Some(path) => TriggerDecision::Trigger {
                reason: format!("push touches '{}'", path),
            },
            None => TriggerDecision::Skip {
                reason: format!(
                    "all {} changed path(s) match paths-ignore",
                    event.changed_paths.len()
                ),
            },
        }
    }

    fn evaluate_pull_request(&self, event: &EventDescriptor) -> TriggerDecision {
        if !self.pull_request_enabled {
            return TriggerDecision::Skip {
                reason: "pull_request trigger is not enabled".to_string(),
            };
        }

        match &event.action {
            Some(action) if self.pull_request_actions.contains(action) => {
                TriggerDecision::Trigger {
                    reason: format!("pull request {}", action),
                }
            }
            Some(action) => TriggerDecision::Skip {
                reason: format!("pull request action '{}' is not a trigger", action),
            },
            None => TriggerDecision::Skip {
                reason: "pull request event without an action".to_string(),
            },
        }
    }
}
