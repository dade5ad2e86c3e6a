//! External collaborators: source checkout and container runtime

pub mod container;
pub mod git;
pub mod output;
pub mod process;

use async_trait::async_trait;
pub use container::{check_runtime_available, CliRuntime};
pub use git::{GitSource, LocalTree};
pub use output::{BackendError, CommandOutput};
use std::path::{Path, PathBuf};

/// Which output stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Receives process output line by line
pub trait LogSink: Send + Sync {
    fn on_line(&self, stream: LogStream, line: &str);
}

/// Image build parameters
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tag given to the built image
    pub tag: String,
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile, when not `<context>/Dockerfile`
    pub dockerfile: Option<PathBuf>,
    /// Directory the build is started from
    pub workdir: PathBuf,
}

/// Container run parameters
#[derive(Debug, Clone)]
pub struct ContainerRunRequest {
    /// Image to start
    pub tag: String,
    /// Container name, so a container left behind by a killed client can be removed
    pub name: String,
    /// Shell that interprets `script`
    pub shell: String,
    /// Command sequence executed inside the container
    pub script: String,
    /// Env file passed with `--env-file`
    pub env_file: Option<PathBuf>,
}

/// Produces repository contents for a run
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Materialize the repository at `revision` (or its default head) in `dest`
    async fn checkout(
        &self,
        dest: &Path,
        revision: Option<&str>,
    ) -> Result<CommandOutput, BackendError>;
}

/// Builds images and runs containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError>;

    /// Start a throwaway container and run the script; the exit code decides success
    async fn run(
        &self,
        request: &ContainerRunRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError>;

    /// Force-remove a container by name
    async fn remove_container(&self, name: &str) -> Result<(), BackendError>;

    async fn remove_image(&self, tag: &str) -> Result<(), BackendError>;
}

#[async_trait]
impl<T: SourceProvider + ?Sized> SourceProvider for Box<T> {
    async fn checkout(
        &self,
        dest: &Path,
        revision: Option<&str>,
    ) -> Result<CommandOutput, BackendError> {
        (**self).checkout(dest, revision).await
    }
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for Box<T> {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        (**self).build(request, sink).await
    }

    async fn run(
        &self,
        request: &ContainerRunRequest,
        sink: Option<&dyn LogSink>,
    ) -> Result<CommandOutput, BackendError> {
        (**self).run(request, sink).await
    }

    async fn remove_container(&self, name: &str) -> Result<(), BackendError> {
        (**self).remove_container(name).await
    }

    async fn remove_image(&self, tag: &str) -> Result<(), BackendError> {
        (**self).remove_image(tag).await
    }
}
