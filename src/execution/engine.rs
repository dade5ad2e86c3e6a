//! Main execution engine - drives a run through its steps

use crate::{
    backend::{BackendError, ContainerRuntime, LogSink, LogStream, SourceProvider},
    core::{secrets::SecretStore, EventKind, Run, RunStatus, StepKind, StepState},
    execution::{
        error::RunError,
        executor::{ExecutionResult, StepExecutor},
        workspace::Workspace,
    },
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
        event: EventKind,
        git_ref: Option<String>,
    },
    StepStarted {
        run_id: Uuid,
        step: StepKind,
    },
    StepOutput {
        run_id: Uuid,
        step: StepKind,
        output: String,
    },
    StepCompleted {
        run_id: Uuid,
        step: StepKind,
    },
    StepFailed {
        run_id: Uuid,
        step: StepKind,
        error: String,
        output: String,
    },
    StepSkipped {
        run_id: Uuid,
        step: StepKind,
        reason: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Receives live output from the build and test steps
pub trait RunLogSink: Send + Sync {
    fn on_step_line(&self, run_id: Uuid, step: StepKind, stream: LogStream, line: &str);
}

/// Tags backend output lines with the run and step that produced them
struct StepLog<'a> {
    inner: &'a dyn RunLogSink,
    run_id: Uuid,
    step: StepKind,
}

impl LogSink for StepLog<'_> {
    fn on_line(&self, stream: LogStream, line: &str) {
        self.inner.on_step_line(self.run_id, self.step, stream, line);
    }
}

/// Main run execution engine
pub struct RunEngine<S, C> {
    executor: Arc<StepExecutor<S, C>>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    log_sink: Option<Arc<dyn RunLogSink>>,
    keep_image: bool,
}

impl<S: SourceProvider + 'static, C: ContainerRuntime + 'static> RunEngine<S, C> {
    pub fn new(source: S, runtime: C, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            executor: Arc::new(StepExecutor::new(source, runtime, secrets)),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            log_sink: None,
            keep_image: false,
        }
    }

    /// Stream build and test output as it is produced
    pub fn with_log_sink(mut self, sink: Arc<dyn RunLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Leave the run's image in place after the run
    pub fn keep_image(mut self, keep: bool) -> Self {
        self.keep_image = keep;
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the run: every step in order, stopping at the first failure
    pub async fn execute(&self, run: &mut Run) -> Result<(), RunError> {
        let run_id = run.state.run_id;

        info!(
            "Starting run {} of {} ({})",
            run_id, run.name, run.event.kind
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            workflow: run.name.clone(),
            event: run.event.kind,
            git_ref: run.event.git_ref.clone(),
        })
        .await;

        run.state.start(run.steps.len());

        let mut workspace = match Workspace::prepare(&run.workspace) {
            Ok(workspace) => workspace,
            Err(e) => {
                let error = RunError::Workspace(e);
                self.fail_step(run, StepKind::Checkout, &error, Utc::now())
                    .await;
                self.finish(run).await;
                return Err(error);
            }
        };

        let mut failure = None;

        while let Some(kind) = run.next_step() {
            let step = match run.step(kind).cloned() {
                Some(step) => step,
                None => {
                    error!("Run {} has no {} step", run_id, kind);
                    break;
                }
            };

            let started_at = Utc::now();
            if let Some(s) = run.step_mut(kind) {
                s.state = StepState::Running { started_at };
            }
            run.state.step_started(kind);

            self.emit_event(ExecutionEvent::StepStarted { run_id, step: kind })
                .await;

            let step_log = self.log_sink.as_deref().map(|inner| StepLog {
                inner,
                run_id,
                step: kind,
            });
            let sink = step_log.as_ref().map(|s| s as &dyn LogSink);

            match self.executor.execute(&step, run, &mut workspace, sink).await {
                ExecutionResult::Success { output } => {
                    if let Some(s) = run.step_mut(kind) {
                        s.state = StepState::Completed {
                            output: output.clone(),
                            started_at,
                            completed_at: Utc::now(),
                        };
                    }
                    run.state.step_succeeded(kind);

                    self.emit_event(ExecutionEvent::StepOutput {
                        run_id,
                        step: kind,
                        output,
                    })
                    .await;
                    self.emit_event(ExecutionEvent::StepCompleted { run_id, step: kind })
                        .await;
                }
                ExecutionResult::Failed { error } => {
                    self.fail_step(run, kind, &error, started_at).await;
                    failure = Some(error);
                    break;
                }
            }
        }

        // A killed or timed-out client leaves its container running; `--rm` only
        // fires when the container exits on its own
        if let Some(RunError::Test(e)) = &failure {
            if !matches!(e, BackendError::NonZeroExit { .. }) {
                let name = run.container_name();
                if let Err(e) = self.executor.runtime().remove_container(&name).await {
                    warn!("Failed to remove container {}: {}", name, e);
                }
            }
        }

        if run.image_built() && !self.keep_image {
            let tag = run.image_tag();
            if let Err(e) = self.executor.runtime().remove_image(&tag).await {
                warn!("Failed to remove image {}: {}", tag, e);
            }
        }

        if let Err(e) = workspace.cleanup().await {
            warn!("Failed to clean up workspace for run {}: {}", run_id, e);
        }

        self.finish(run).await;

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Mark a step failed and every later step skipped
    async fn fail_step(
        &self,
        run: &mut Run,
        kind: StepKind,
        error: &RunError,
        started_at: DateTime<Utc>,
    ) {
        let run_id = run.state.run_id;
        let message = error.to_string();
        let output = error.output();

        if let Some(step) = run.step_mut(kind) {
            step.state = StepState::Failed {
                error: message.clone(),
                output: output.clone(),
                started_at,
                failed_at: Utc::now(),
            };
        }
        run.state.fail(kind);

        self.emit_event(ExecutionEvent::StepFailed {
            run_id,
            step: kind,
            error: message,
            output,
        })
        .await;

        let reason = format!("{} failed", kind.id());
        let mut skipped = Vec::new();
        for step in run.steps.iter_mut() {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.clone(),
                };
                skipped.push(step.kind);
            }
        }

        for step in skipped {
            self.emit_event(ExecutionEvent::StepSkipped {
                run_id,
                step,
                reason: reason.clone(),
            })
            .await;
        }
    }

    async fn finish(&self, run: &Run) {
        let status = run.state.status;
        info!("Run {} of {} finished: {:?}", run.state.run_id, run.name, status);
        self.emit_event(ExecutionEvent::RunCompleted {
            run_id: run.state.run_id,
            status,
        })
        .await;
    }
}
