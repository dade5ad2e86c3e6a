//! Run state models

use crate::core::step::StepKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every step succeeded
    Passed,
    /// A step failed
    Failed,
}

/// Position of a run in its step sequence
///
/// Idle → CheckedOut → SecretsWritten → ImageBuilt → TestsRunning → Passed,
/// with any step failure moving straight to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    CheckedOut,
    SecretsWritten,
    ImageBuilt,
    TestsRunning,
    Passed,
    Failed,
}

impl RunPhase {
    /// The step allowed to run from this phase
    pub fn next_step(&self) -> Option<StepKind> {
        match self {
            RunPhase::Idle => Some(StepKind::Checkout),
            RunPhase::CheckedOut => Some(StepKind::Secrets),
            RunPhase::SecretsWritten => Some(StepKind::Build),
            RunPhase::ImageBuilt => Some(StepKind::Test),
            RunPhase::TestsRunning | RunPhase::Passed | RunPhase::Failed => None,
        }
    }

    /// Phase entered when `step` starts
    pub fn on_start(self, step: StepKind) -> Self {
        match step {
            StepKind::Test => RunPhase::TestsRunning,
            _ => self,
        }
    }

    /// Phase entered when `step` succeeds
    pub fn on_success(self, step: StepKind) -> Self {
        match step {
            StepKind::Checkout => RunPhase::CheckedOut,
            StepKind::Secrets => RunPhase::SecretsWritten,
            StepKind::Build => RunPhase::ImageBuilt,
            StepKind::Test => RunPhase::Passed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Passed | RunPhase::Failed)
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not started
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step completed successfully
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed
    Failed {
        error: String,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never started because an earlier step failed
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current status
    pub status: RunStatus,

    /// Current phase of the step sequence
    pub phase: RunPhase,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run passed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// The step that failed, if any
    pub failed_step: Option<StepKind>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            phase: RunPhase::Idle,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_step: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = RunStatus::Running;
        self.phase = RunPhase::Idle;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Record a step starting
    pub fn step_started(&mut self, step: StepKind) {
        self.phase = self.phase.on_start(step);
    }

    /// Record a step success
    pub fn step_succeeded(&mut self, step: StepKind) {
        self.phase = self.phase.on_success(step);
        self.completed_steps += 1;
        if self.phase == RunPhase::Passed {
            self.status = RunStatus::Passed;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Mark run as failed at `step`
    pub fn fail(&mut self, step: StepKind) {
        self.phase = RunPhase::Failed;
        self.status = RunStatus::Failed;
        self.failed_step = Some(step);
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed without a failing step
    pub fn abort(&mut self) {
        self.phase = RunPhase::Failed;
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Fraction of steps completed (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
