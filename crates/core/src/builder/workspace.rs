//! Per-build scratch directories.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::Provider;

use super::error::BuildError;

/// Scratch space owned by one build attempt.
///
/// Layout: `<base>/<provider>-<uuid>/{input,converted,output}`. The whole tree
/// is removed when the workspace is dropped, on every exit path.
#[derive(Debug)]
pub struct BuildWorkspace {
    root: PathBuf,
    removed: bool,
}

impl BuildWorkspace {
    pub async fn create(base: &Path, provider: Provider) -> Result<Self, BuildError> {
        let root = base.join(format!("{}-{}", provider.table_prefix(), Uuid::new_v4()));
        let workspace = Self {
            root,
            removed: false,
        };

        for dir in [workspace.input(), workspace.converted(), workspace.output()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| BuildError::Workspace { path: dir, source })?;
        }

        debug!("Created workspace {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw bundle files copied from the download area.
    pub fn input(&self) -> PathBuf {
        self.root.join("input")
    }

    /// Converter output, compiler input for providers that convert.
    pub fn converted(&self) -> PathBuf {
        self.root.join("converted")
    }

    /// Compiler output.
    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Remove the workspace now, reporting failures.
    pub async fn cleanup(mut self) -> Result<(), BuildError> {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BuildError::Workspace {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

impl Drop for BuildWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.root.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_layout() {
        let base = TempDir::new().unwrap();
        let ws = BuildWorkspace::create(base.path(), Provider::RoyalMail)
            .await
            .unwrap();

        assert!(ws.input().is_dir());
        assert!(ws.converted().is_dir());
        assert!(ws.output().is_dir());
        let name = ws.root().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("royalmail-"));
    }

    #[tokio::test]
    async fn test_drop_removes_tree() {
        let base = TempDir::new().unwrap();
        let root = {
            let ws = BuildWorkspace::create(base.path(), Provider::Parascript)
                .await
                .unwrap();
            std::fs::write(ws.output().join("dir.bin"), b"data").unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_explicit_cleanup() {
        let base = TempDir::new().unwrap();
        let ws = BuildWorkspace::create(base.path(), Provider::SmartMatch)
            .await
            .unwrap();
        let root = ws.root().to_path_buf();
        ws.cleanup().await.unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_workspaces_are_distinct() {
        let base = TempDir::new().unwrap();
        let a = BuildWorkspace::create(base.path(), Provider::SmartMatch).await.unwrap();
        let b = BuildWorkspace::create(base.path(), Provider::SmartMatch).await.unwrap();
        assert_ne!(a.root(), b.root());
    }
}
