//! Run failure taxonomy

use crate::backend::BackendError;
use crate::core::StepKind;
use std::time::Duration;
use thiserror::Error;

/// Why a run failed; one variant per step
#[derive(Debug, Error)]
pub enum RunError {
    #[error("checkout failed: {0}")]
    Checkout(#[source] BackendError),

    #[error("secrets not written: {0}")]
    Secrets(String),

    #[error("image build failed: {0}")]
    Build(#[source] BackendError),

    #[error("tests failed: {0}")]
    Test(#[source] BackendError),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    /// The run's task died before the run could finish
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl RunError {
    /// `step` ran past its time limit
    pub fn timed_out(step: StepKind, limit: Duration) -> Self {
        let error = BackendError::Timeout(limit);
        match step {
            StepKind::Checkout => RunError::Checkout(error),
            StepKind::Secrets => RunError::Secrets(error.to_string()),
            StepKind::Build => RunError::Build(error),
            StepKind::Test => RunError::Test(error),
        }
    }

    /// Output the failing command produced, if any
    pub fn output(&self) -> String {
        match self {
            RunError::Checkout(e) | RunError::Build(e) | RunError::Test(e) => {
                e.output().map(|o| o.combined()).unwrap_or_default()
            }
            _ => String::new(),
        }
    }
}
