//! Git-backed source checkout

use crate::backend::{process::run_command, BackendError, CommandOutput, SourceProvider};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Clones a repository (local path or URL) into the run workspace
#[derive(Debug, Clone)]
pub struct GitSource {
    /// Path to the git executable
    git: String,

    /// Repository to clone from
    repository: String,
}

impl GitSource {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            git: "git".to_string(),
            repository: repository.into(),
        }
    }

    fn git_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.arg("-C").arg(dir);
        cmd
    }

    async fn checkout_revision(
        &self,
        dest: &Path,
        revision: &str,
    ) -> Result<CommandOutput, BackendError> {
        // Branch refs only exist as remote-tracking refs in a fresh clone
        let local = match revision.strip_prefix("refs/heads/") {
            Some(branch) => format!("origin/{}", branch),
            None => revision.to_string(),
        };

        let mut cmd = self.git_in(dest);
        cmd.args(["checkout", "--quiet", "--detach", &local]);
        match run_command(cmd, &self.git, None, None).await {
            Ok(output) => return Ok(output),
            Err(BackendError::NonZeroExit { .. }) => {
                debug!("{} not in the clone, fetching it", revision);
            }
            Err(e) => return Err(e),
        }

        let mut fetch = self.git_in(dest);
        fetch.args(["fetch", "--quiet", "origin", revision]);
        run_command(fetch, &self.git, None, None).await?;

        let mut cmd = self.git_in(dest);
        cmd.args(["checkout", "--quiet", "--detach", "FETCH_HEAD"]);
        run_command(cmd, &self.git, None, None).await
    }
}

#[async_trait]
impl SourceProvider for GitSource {
    async fn checkout(
        &self,
        dest: &Path,
        revision: Option<&str>,
    ) -> Result<CommandOutput, BackendError> {
        info!("Cloning {} into {}", self.repository, dest.display());

        let mut clone = Command::new(&self.git);
        clone
            .args(["clone", "--quiet"])
            .arg(&self.repository)
            .arg(dest);
        let mut output = run_command(clone, &self.git, None, None).await?;

        if let Some(revision) = revision {
            info!("Checking out {}", revision);
            let checkout = self.checkout_revision(dest, revision).await?;
            output.stdout.push_str(&checkout.stdout);
            output.stderr.push_str(&checkout.stderr);
        }

        let head = head_commit(&self.git, dest).await?;
        output.stdout.push_str(&format!("HEAD is now at {}\n", head));
        Ok(output)
    }
}

/// Uses an existing working tree as the workspace, without cloning
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceProvider for LocalTree {
    async fn checkout(
        &self,
        dest: &Path,
        revision: Option<&str>,
    ) -> Result<CommandOutput, BackendError> {
        if dest != self.root {
            return Err(BackendError::Internal(format!(
                "in-place workspace {} does not match working tree {}",
                dest.display(),
                self.root.display()
            )));
        }

        let metadata = tokio::fs::metadata(dest).await?;
        if !metadata.is_dir() {
            return Err(BackendError::Internal(format!(
                "{} is not a directory",
                dest.display()
            )));
        }

        if let Some(revision) = revision {
            warn!(
                "In-place run ignores revision {}; using the working tree as-is",
                revision
            );
        }

        Ok(CommandOutput::success(format!(
            "Using working tree at {}\n",
            dest.display()
        )))
    }
}

/// Resolve `HEAD` in a repository
pub async fn head_commit(git: &str, repo: &Path) -> Result<String, BackendError> {
    let mut cmd = Command::new(git);
    cmd.arg("-C").arg(repo).args(["rev-parse", "HEAD"]);
    let output = run_command(cmd, git, None, None).await?;
    Ok(output.stdout.trim().to_string())
}

/// Paths changed between `base` and `head` (merge-base diff)
///
/// Paths come back exactly as stored in the tree, without `core.quotePath`
/// escaping.
pub async fn changed_paths(
    git: &str,
    repo: &Path,
    base: &str,
    head: &str,
) -> Result<Vec<String>, BackendError> {
    let mut cmd = Command::new(git);
    cmd.arg("-C")
        .arg(repo)
        .args(["diff", "--name-only", "-z", &format!("{}...{}", base, head)]);
    let output = run_command(cmd, git, None, None).await?;
    Ok(split_name_list(&output.stdout))
}

/// Split NUL-terminated `--name-only -z` output
fn split_name_list(stdout: &str) -> Vec<String> {
    stdout
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}
