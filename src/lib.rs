//! ci-runner - local CI trigger policy and containerized test runner

pub mod backend;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use backend::{CliRuntime, ContainerRuntime, GitSource, LocalTree, SourceProvider};
pub use core::{EventDescriptor, EventKind, PrAction, Run, RunStatus, StepKind, StepState};
pub use core::{TriggerDecision, TriggerPolicy};
pub use execution::{ExecutionEvent, RunDispatcher, RunEngine, RunError};
