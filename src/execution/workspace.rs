//! Per-run workspace directory

use crate::core::WorkspaceMode;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Directory a run checks out into
///
/// Ephemeral workspaces are deleted on cleanup (or drop). In-place
/// workspaces get every file the run overwrote restored on cleanup.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    temp: Option<TempDir>,
    protected: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Workspace {
    pub fn prepare(mode: &WorkspaceMode) -> io::Result<Self> {
        match mode {
            WorkspaceMode::Ephemeral => {
                let temp = tempfile::Builder::new().prefix("ci-runner-").tempdir()?;
                let root = temp.path().join("src");
                debug!("Created ephemeral workspace {}", temp.path().display());
                Ok(Self {
                    root,
                    temp: Some(temp),
                    protected: Vec::new(),
                })
            }
            WorkspaceMode::InPlace(path) => Ok(Self {
                root: path.clone(),
                temp: None,
                protected: Vec::new(),
            }),
        }
    }

    /// Checkout destination and workspace root
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn is_ephemeral(&self) -> bool {
        self.temp.is_some()
    }

    /// Remember a file's current content so cleanup can put it back
    pub async fn protect(&mut self, path: &Path) -> io::Result<()> {
        if self.is_ephemeral() || self.protected.iter().any(|(p, _)| p == path) {
            return Ok(());
        }

        let original = match tokio::fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        self.protected.push((path.to_path_buf(), original));
        Ok(())
    }

    /// Tear the workspace down
    pub async fn cleanup(mut self) -> io::Result<()> {
        for (path, original) in self.protected.drain(..) {
            match original {
                Some(bytes) => tokio::fs::write(&path, bytes).await?,
                None => match tokio::fs::remove_file(&path).await {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                    _ => {}
                },
            }
        }

        if let Some(temp) = self.temp.take() {
            debug!("Removing ephemeral workspace {}", temp.path().display());
            temp.close()?;
        }
        Ok(())
    }
}
