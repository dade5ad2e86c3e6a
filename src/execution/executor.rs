//! Step executor - runs individual steps against the backends

use crate::{
    backend::{BuildRequest, ContainerRunRequest, ContainerRuntime, LogSink, SourceProvider},
    core::{secrets::SecretSet, secrets::SecretStore, Run, Step, StepKind},
    execution::{error::RunError, workspace::Workspace},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of executing a step
#[derive(Debug)]
pub enum ExecutionResult {
    /// Step completed successfully
    Success { output: String },
    /// Step failed; the run stops here
    Failed { error: RunError },
}

/// Executes a single step
pub struct StepExecutor<S, C> {
    source: S,
    runtime: C,
    secrets: Arc<dyn SecretStore>,
}

impl<S: SourceProvider, C: ContainerRuntime> StepExecutor<S, C> {
    pub fn new(source: S, runtime: C, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            source,
            runtime,
            secrets,
        }
    }

    pub fn runtime(&self) -> &C {
        &self.runtime
    }

    /// Execute a step and return the result
    pub async fn execute(
        &self,
        step: &Step,
        run: &Run,
        workspace: &mut Workspace,
        sink: Option<&dyn LogSink>,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.kind.name());

        let work = async {
            match step.kind {
                StepKind::Checkout => self.checkout(run, workspace).await,
                StepKind::Secrets => self.write_secrets(run, workspace).await,
                StepKind::Build => self.build(run, workspace, sink).await,
                StepKind::Test => self.test(run, workspace, sink).await,
            }
        };

        // The limit covers the whole step, every command it spawns included
        let result = match step.timeout() {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or_else(|_| Err(RunError::timed_out(step.kind, limit))),
            None => work.await,
        };

        match result {
            Ok(output) => {
                debug!("Step {} output: {} bytes", step.kind, output.len());
                ExecutionResult::Success { output }
            }
            Err(error) => {
                warn!("Step {} failed: {}", step.kind, error);
                ExecutionResult::Failed { error }
            }
        }
    }

    async fn checkout(&self, run: &Run, workspace: &Workspace) -> Result<String, RunError> {
        let output = self
            .source
            .checkout(workspace.path(), run.event.revision())
            .await
            .map_err(RunError::Checkout)?;
        Ok(output.combined())
    }

    async fn write_secrets(&self, run: &Run, workspace: &mut Workspace) -> Result<String, RunError> {
        let settings = &run.settings;
        let set = SecretSet::resolve(&settings.secret_names, self.secrets.as_ref());
        let missing = set.missing();
        let multiline = set.multiline();

        if settings.require_secrets && !missing.is_empty() {
            return Err(RunError::Secrets(format!(
                "missing or empty: {}",
                missing.join(", ")
            )));
        }
        if settings.require_secrets && !multiline.is_empty() {
            return Err(RunError::Secrets(format!(
                "line break in value: {}",
                multiline.join(", ")
            )));
        }

        let mut output = String::new();
        for name in &missing {
            warn!("Secret {} is not set; writing an empty value", name);
            output.push_str(&format!("warning: {} is empty\n", name));
        }
        for name in &multiline {
            warn!(
                "Secret {} contains a line break; the env file will carry extra lines",
                name
            );
            output.push_str(&format!("warning: {} contains a line break\n", name));
        }

        let path = workspace.path().join(&settings.env_file);
        workspace.protect(&path).await?;
        set.write_env_file(&path).await?;

        output.push_str(&format!(
            "Wrote {} secret(s) to {}\n",
            set.len(),
            settings.env_file
        ));
        Ok(output)
    }

    async fn build(
        &self,
        run: &Run,
        workspace: &Workspace,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, RunError> {
        let settings = &run.settings;
        let request = BuildRequest {
            tag: run.image_tag(),
            context: workspace.path().join(&settings.context),
            dockerfile: settings
                .dockerfile
                .as_ref()
                .map(|d| workspace.path().join(d)),
            workdir: workspace.path().to_path_buf(),
        };

        let output = self
            .runtime
            .build(&request, sink)
            .await
            .map_err(RunError::Build)?;
        Ok(output.combined())
    }

    async fn test(
        &self,
        run: &Run,
        workspace: &Workspace,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, RunError> {
        let settings = &run.settings;
        let request = ContainerRunRequest {
            tag: run.image_tag(),
            name: run.container_name(),
            shell: settings.shell.clone(),
            script: settings.script.clone(),
            env_file: settings
                .pass_env_file
                .then(|| workspace.path().join(&settings.env_file)),
        };

        let output = self
            .runtime
            .run(&request, sink)
            .await
            .map_err(RunError::Test)?;
        Ok(output.combined())
    }
}
