//! Container runtime driven through the `docker`/`podman` CLI

use crate::backend::{
    process::run_command, BackendError, BuildRequest, CommandOutput, ContainerRunRequest,
    ContainerRuntime, LogSink,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Limit for short runtime housekeeping commands (`--version`, `rm`, `rmi`)
const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(60);

/// Checks that the container CLI is installed and answers `--version`
pub async fn check_runtime_available(program: &str) -> Result<String, BackendError> {
    let mut cmd = Command::new(program);
    cmd.arg("--version");
    let output = run_command(cmd, program, Some(HOUSEKEEPING_TIMEOUT), None).await?;
    let version = output.stdout.trim().to_string();
    debug!("Container runtime available: {}", version);
    Ok(version)
}

/// Docker-compatible CLI runtime
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: String,
}

impl CliRuntime {
    /// `program` is `docker`, `podman`, or a path to either
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for `build`
    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-t".to_string(), request.tag.clone()];
        if let Some(dockerfile) = &request.dockerfile {
            args.push("-f".to_string());
            args.push(dockerfile.display().to_string());
        }
        args.push(request.context.display().to_string());
        args
    }

    /// Arguments for `run`
    pub fn run_args(request: &ContainerRunRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];
        if let Some(env_file) = &request.env_file {
            args.push("--env-file".to_string());
            args.push(env_file.display().to_string());
        }
        args.push(request.tag.clone());
        args.push(request.shell.clone());
        args.push("-c".to_string());
        args.push(request.script.clone());
        args
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        info!("Building image {}", request.tag);
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::build_args(request)).current_dir(&request.workdir);
        run_command(cmd, &self.program, None, sink).await
    }

    async fn run(
        &self,
        request: &ContainerRunRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        info!("Running `{}` in {}", request.script, request.tag);
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::run_args(request));
        run_command(cmd, &self.program, None, sink).await
    }

    async fn remove_container(&self, name: &str) -> Result<(), BackendError> {
        debug!("Removing container {}", name);
        let mut cmd = Command::new(&self.program);
        cmd.args(["rm", "--force", name]);
        run_command(cmd, &self.program, Some(HOUSEKEEPING_TIMEOUT), None).await?;
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<(), BackendError> {
        debug!("Removing image {}", tag);
        let mut cmd = Command::new(&self.program);
        cmd.args(["rmi", "--force", tag]);
        run_command(cmd, &self.program, Some(HOUSEKEEPING_TIMEOUT), None).await?;
        Ok(())
    }
}
