//! Artifact storage

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;

/// Where coordinated artifacts are written. Paths are relative to the
/// store root and use `/` separators.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn write_artifact(&self, path: &str, content: &str) -> Result<(), OrchestratorError>;

    /// Paths of every artifact below `directory`
    async fn list_artifacts(&self, directory: &str) -> Result<Vec<String>, OrchestratorError>;

    async fn read_artifact(&self, path: &str) -> Result<String, OrchestratorError>;
}

/// Artifact store on the local file system
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: Dir,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Dir::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }
}

/// Reject paths that could escape the store root
fn relative(path: &str) -> Result<&Path, OrchestratorError> {
    let candidate = Path::new(path);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(OrchestratorError::ArtifactWriteError(format!(
            "Invalid artifact path: {:?}",
            path
        )));
    }
    Ok(candidate)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_artifact(&self, path: &str, content: &str) -> Result<(), OrchestratorError> {
        let file = self.root.file(relative(path)?);
        file.write_atomic(content.as_bytes())
            .await
            .map_err(|e| OrchestratorError::ArtifactWriteError(format!("{}: {}", path, e)))
    }

    async fn list_artifacts(&self, directory: &str) -> Result<Vec<String>, OrchestratorError> {
        let dir = if directory.is_empty() {
            self.root.clone()
        } else {
            self.root.subdir(relative(directory)?)
        };
        let files = dir.list_files_recursive().await?;
        let prefix = Path::new(directory);
        Ok(files.iter().map(|f| to_slash(&prefix.join(f))).collect())
    }

    async fn read_artifact(&self, path: &str) -> Result<String, OrchestratorError> {
        self.root.file(relative(path)?).read_string().await
    }
}
