//! Scenario-based tests for ci-runner

mod dispatch;
mod secrets;
mod triggering;
