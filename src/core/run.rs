//! Run domain model

use crate::core::{
    config::WorkflowConfig,
    event::EventDescriptor,
    state::{RunState, RunStatus, StepState},
    step::{Step, StepKind},
};
use std::path::PathBuf;

/// Where a run checks out the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceMode {
    /// Fresh temporary directory, removed when the run ends
    Ephemeral,
    /// An existing working tree, used as-is
    InPlace(PathBuf),
}

/// Per-run settings taken from the workflow configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub secret_names: Vec<String>,
    pub env_file: String,
    pub require_secrets: bool,
    pub image: String,
    pub context: String,
    pub dockerfile: Option<String>,
    pub shell: String,
    pub script: String,
    pub pass_env_file: bool,
}

/// One end-to-end execution of the workflow for a single event
#[derive(Debug, Clone)]
pub struct Run {
    /// Workflow name
    pub name: String,

    /// The event that triggered this run
    pub event: EventDescriptor,

    pub settings: RunSettings,

    pub workspace: WorkspaceMode,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: RunState,
}

impl Run {
    /// Create a run from configuration
    pub fn from_config(
        config: &WorkflowConfig,
        event: EventDescriptor,
        workspace: WorkspaceMode,
    ) -> Self {
        let steps = StepKind::ALL
            .into_iter()
            .map(|kind| {
                let timeout = match kind {
                    StepKind::Checkout => config.checkout.timeout_secs,
                    StepKind::Secrets => None,
                    StepKind::Build => config.build.timeout_secs,
                    StepKind::Test => config.test.timeout_secs,
                };
                Step::new(kind, timeout)
            })
            .collect();

        Run {
            name: config.name.clone(),
            event,
            settings: RunSettings {
                secret_names: config.secrets.names.clone(),
                env_file: config.secrets.env_file.clone(),
                require_secrets: config.secrets.require_non_empty,
                image: config.build.image.clone(),
                context: config.build.context.clone(),
                dockerfile: config.build.dockerfile.clone(),
                shell: config.test.shell.clone(),
                script: config.test.script(),
                pass_env_file: config.test.pass_env_file,
            },
            workspace,
            steps,
            state: RunState::new(),
        }
    }

    /// Get a step by kind
    pub fn step(&self, kind: StepKind) -> Option<&Step> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// Get a mutable step by kind
    pub fn step_mut(&mut self, kind: StepKind) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    /// The next step to execute, if the run can continue
    pub fn next_step(&self) -> Option<StepKind> {
        self.state.phase.next_step()
    }

    /// Image tag unique to this run
    pub fn image_tag(&self) -> String {
        let id = self.state.run_id.simple().to_string();
        format!("{}:run-{}", self.settings.image, &id[..12])
    }

    /// Name of the test container; a valid container name derived from the image tag
    pub fn container_name(&self) -> String {
        self.image_tag()
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
                _ => '-',
            })
            .collect()
    }

    /// Fail the run without attributing it to a step; unfinished steps are skipped
    pub fn abort(&mut self, reason: &str) {
        for step in self.steps.iter_mut() {
            if !step.state.is_terminal() {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
        self.state.abort();
    }

    pub fn has_failed(&self) -> bool {
        self.state.status == RunStatus::Failed
    }

    pub fn passed(&self) -> bool {
        self.state.status == RunStatus::Passed
    }

    /// Whether the image exists and needs removal
    pub fn image_built(&self) -> bool {
        matches!(
            self.step(StepKind::Build).map(|s| &s.state),
            Some(StepState::Completed { .. })
        )
    }
}
