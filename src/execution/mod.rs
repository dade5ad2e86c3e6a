//! Run execution engine

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod executor;
pub mod workspace;

pub use dispatcher::{DispatchResult, RunDispatcher};
pub use engine::{ExecutionEvent, RunEngine, RunLogSink};
pub use error::RunError;
pub use executor::{ExecutionResult, StepExecutor};
pub use workspace::Workspace;
