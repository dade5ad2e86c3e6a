//! Core domain models
//!
//! Events, the trigger policy, workflow configuration, secrets, and the
//! run/step state machine.

pub mod config;
pub mod event;
pub mod run;
pub mod secrets;
pub mod state;
pub mod step;
pub mod trigger;

pub use event::*;
pub use run::*;
pub use state::*;
pub use step::*;
pub use trigger::{TriggerDecision, TriggerPolicy};
