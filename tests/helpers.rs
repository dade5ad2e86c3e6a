//! Test utility functions for ci-runner

#![allow(dead_code)]

use async_trait::async_trait;
use ci_runner::backend::{
    BackendError, BuildRequest, CommandOutput, ContainerRunRequest, ContainerRuntime, LogSink,
    LogStream, SourceProvider,
};
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::secrets::{SecretStore, StaticSecretStore};
use ci_runner::core::{EventDescriptor, Run, RunStatus, StepKind, StepState, WorkspaceMode};
use ci_runner::execution::{ExecutionEvent, RunEngine, RunError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock runtime was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Build {
        tag: String,
        context: PathBuf,
        /// Content of `.env` in the workspace at build time
        env_file: Option<String>,
    },
    Run {
        tag: String,
        name: String,
        script: String,
        env_file: Option<PathBuf>,
    },
    RemoveContainer {
        name: String,
    },
    RemoveImage {
        tag: String,
    },
}

/// Mock source that writes a fixed file tree instead of cloning
pub struct MockSource {
    files: Vec<(String, String)>,
    failing_revision: Option<String>,
    delay: Option<Duration>,
    checkouts: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            files: vec![
                ("Dockerfile".to_string(), "FROM python:3.11-slim\n".to_string()),
                ("tests/requirements.txt".to_string(), "pytest\n".to_string()),
                ("tests/test_app.py".to_string(), "def test_ok():\n    pass\n".to_string()),
            ],
            failing_revision: None,
            delay: None,
            checkouts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every checkout fails
    pub fn failing() -> Self {
        Self::new().fail_on_revision("*")
    }

    /// Checkouts of `revision` fail (`*` fails all)
    pub fn fail_on_revision(mut self, revision: &str) -> Self {
        self.failing_revision = Some(revision.to_string());
        self
    }

    /// Make every checkout take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn checkout_count(&self) -> Arc<AtomicUsize> {
        self.checkouts.clone()
    }
}

#[async_trait]
impl SourceProvider for MockSource {
    async fn checkout(
        &self,
        dest: &Path,
        revision: Option<&str>,
    ) -> Result<CommandOutput, BackendError> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fails = match self.failing_revision.as_deref() {
            Some("*") => true,
            Some(failing) => revision == Some(failing),
            None => false,
        };
        if fails {
            return Err(BackendError::NonZeroExit {
                program: "git".to_string(),
                code: 128,
                output: CommandOutput {
                    exit_code: 128,
                    stdout: String::new(),
                    stderr: "fatal: reference is not a tree\n".to_string(),
                },
            });
        }

        for (path, contents) in &self.files {
            let path = dest.join(path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
        }

        Ok(CommandOutput::success(format!(
            "Checked out {}\n",
            revision.unwrap_or("HEAD")
        )))
    }
}

/// Mock container runtime with configurable exit codes
#[derive(Clone)]
pub struct MockRuntime {
    build_exit: i32,
    test_exit: i32,
    delay: Option<Duration>,
    test_hang: Option<Duration>,
    calls: Arc<Mutex<Vec<RuntimeCall>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            build_exit: 0,
            test_exit: 0,
            delay: None,
            test_hang: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn build_exit(mut self, code: i32) -> Self {
        self.build_exit = code;
        self
    }

    pub fn test_exit(mut self, code: i32) -> Self {
        self.test_exit = code;
        self
    }

    /// Make every build and test take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the test container run this long before it reports anything
    pub fn hang_tests(mut self, duration: Duration) -> Self {
        self.test_hang = Some(duration);
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of builds/tests that were in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn work(
        &self,
        program_output: &str,
        code: i32,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(sink) = sink {
            for line in program_output.lines() {
                sink.on_line(LogStream::Stdout, line);
            }
        }

        let output = CommandOutput {
            exit_code: code,
            stdout: program_output.to_string(),
            stderr: String::new(),
        };
        if code == 0 {
            Ok(output)
        } else {
            Err(BackendError::NonZeroExit {
                program: "docker".to_string(),
                code,
                output,
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        let env_file = tokio::fs::read_to_string(request.workdir.join(".env"))
            .await
            .ok();
        self.calls.lock().unwrap().push(RuntimeCall::Build {
            tag: request.tag.clone(),
            context: request.context.clone(),
            env_file,
        });

        let output = if self.build_exit == 0 {
            format!("Step 1/3 : FROM python:3.11-slim\nSuccessfully tagged {}\n", request.tag)
        } else {
            "Step 1/3 : FROM python:3.11-slim\nERROR: failed to solve\n".to_string()
        };
        self.work(&output, self.build_exit, sink).await
    }

    async fn run(
        &self,
        request: &ContainerRunRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        self.calls.lock().unwrap().push(RuntimeCall::Run {
            tag: request.tag.clone(),
            name: request.name.clone(),
            script: request.script.clone(),
            env_file: request.env_file.clone(),
        });

        if let Some(hang) = self.test_hang {
            tokio::time::sleep(hang).await;
        }

        let output = if self.test_exit == 0 {
            "collected 1 item\n1 passed in 0.01s\n"
        } else {
            "collected 1 item\n1 failed in 0.02s\n"
        };
        self.work(output, self.test_exit, sink).await
    }

    async fn remove_container(&self, name: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(RuntimeCall::RemoveContainer {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(RuntimeCall::RemoveImage {
            tag: tag.to_string(),
        });
        Ok(())
    }
}

/// Both secrets set
pub fn test_secrets() -> StaticSecretStore {
    StaticSecretStore::new()
        .with("CLIENT_ID", "client-id-123")
        .with("CLIENT_SECRET", "s3cr3t")
}

/// Result of running a workflow with mocks
#[derive(Debug)]
pub struct RunTestResult {
    pub run: Run,
    pub error: Option<RunError>,
    pub events: Vec<ExecutionEvent>,
}

impl RunTestResult {
    pub fn is_success(&self) -> bool {
        self.run.state.status == RunStatus::Passed && self.error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.run.state.status == RunStatus::Failed
    }

    pub fn step_state(&self, kind: StepKind) -> &StepState {
        &self
            .run
            .step(kind)
            .unwrap_or_else(|| panic!("Step '{}' not found in run", kind))
            .state
    }

    /// Steps in the order they reported StepStarted
    pub fn started_steps(&self) -> Vec<StepKind> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::StepStarted { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} - {}/{} steps, error: {:?}",
            self.run.state.status,
            self.run.state.completed_steps,
            self.run.state.total_steps,
            self.error.as_ref().map(|e| e.to_string())
        )
    }
}

/// Run one event through a fresh engine
pub async fn run_with<S, C>(
    config: &WorkflowConfig,
    event: EventDescriptor,
    workspace: WorkspaceMode,
    source: S,
    runtime: C,
    secrets: impl SecretStore + 'static,
) -> RunTestResult
where
    S: SourceProvider + 'static,
    C: ContainerRuntime + 'static,
{
    let engine = RunEngine::new(source, runtime, Arc::new(secrets));
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    engine
        .add_event_handler(move |event| recorded.lock().unwrap().push(event))
        .await;

    let mut run = config.to_run(event, workspace);
    let error = engine.execute(&mut run).await.err();

    let events = events.lock().unwrap().clone();
    RunTestResult { run, error, events }
}

/// Run one event in an ephemeral workspace with both secrets set
pub async fn run_default(
    event: EventDescriptor,
    source: MockSource,
    runtime: MockRuntime,
) -> RunTestResult {
    run_with(
        &WorkflowConfig::default(),
        event,
        WorkspaceMode::Ephemeral,
        source,
        runtime,
        test_secrets(),
    )
    .await
}

/// Assert a step completed and its output contains `expected_output`
pub fn assert_step_completed(result: &RunTestResult, kind: StepKind, expected_output: &str) {
    match result.step_state(kind) {
        StepState::Completed { output, .. } => assert!(
            output.contains(expected_output),
            "Step '{}' output:\n{}\n\ndoes not contain:\n{}",
            kind,
            output,
            expected_output
        ),
        other => panic!("Step '{}' should be completed, but was: {:?}", kind, other),
    }
}

/// Assert a step failed with an error containing `expected_error`
pub fn assert_step_failed(result: &RunTestResult, kind: StepKind, expected_error: &str) {
    match result.step_state(kind) {
        StepState::Failed { error, .. } => assert!(
            error.contains(expected_error),
            "Step '{}' error:\n{}\n\ndoes not contain:\n{}",
            kind,
            error,
            expected_error
        ),
        other => panic!("Step '{}' should have failed, but was: {:?}", kind, other),
    }
}

/// Assert a step never ran
pub fn assert_step_skipped(result: &RunTestResult, kind: StepKind) {
    assert!(
        matches!(result.step_state(kind), StepState::Skipped { .. }),
        "Step '{}' should be skipped, but was: {:?}",
        kind,
        result.step_state(kind)
    );
}

pub fn assert_run_passed(result: &RunTestResult) {
    assert!(
        result.is_success(),
        "Run should have passed, but was: {}",
        result.summary()
    );
}

pub fn assert_run_failed(result: &RunTestResult) {
    assert!(
        result.is_failed(),
        "Run should have failed, but was: {}",
        result.summary()
    );
}

/// Count runtime calls of one kind
pub fn count_builds(calls: &[RuntimeCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, RuntimeCall::Build { .. }))
        .count()
}

pub fn count_test_runs(calls: &[RuntimeCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, RuntimeCall::Run { .. }))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_writes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("src");

        MockSource::new().checkout(&dest, None).await.unwrap();
        assert!(dest.join("Dockerfile").exists());
        assert!(dest.join("tests/requirements.txt").exists());
    }

    #[tokio::test]
    async fn test_mock_runtime_reports_exit_code() {
        let runtime = MockRuntime::new().test_exit(2);
        let request = ContainerRunRequest {
            tag: "bigdbm:run-x".to_string(),
            name: "bigdbm-run-x".to_string(),
            shell: "sh".to_string(),
            script: "pytest".to_string(),
            env_file: None,
        };

        let err = runtime.run(&request, None).await.unwrap_err();
        assert!(matches!(err, BackendError::NonZeroExit { code: 2, .. }));
        assert_eq!(count_test_runs(&runtime.calls()), 1);
    }
}
