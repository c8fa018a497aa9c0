//! Workspace file I/O seam
//!
//! The transaction manager never touches disk directly; everything goes
//! through [`WorkspaceIo`] so tests and previews can swap in an in-memory
//! workspace.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait WorkspaceIo: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    /// `None` when the file does not exist.
    async fn read(&self, path: &Path) -> io::Result<Option<String>>;
    async fn write(&self, path: &Path, content: &str) -> io::Result<()>;
    async fn delete(&self, path: &Path) -> io::Result<()>;
}

/// Disk-backed workspace rooted at a directory.
///
/// Writes use the temp-file-then-rename pattern so a file is either fully
/// written or unchanged.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl WorkspaceIo for LocalWorkspace {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        let target = self.resolve(path);
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Path has no parent directory")
        })?;
        tokio::fs::create_dir_all(parent).await?;

        // Temp file in the same directory, required for atomic rename.
        let temp = target.with_file_name(format!(
            ".{}.tmp.{}",
            target.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id()
        ));
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &target).await
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-memory workspace for tests and staged-content previews.
#[derive(Default)]
pub struct MemoryWorkspace {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        Self {
            files: Mutex::new(files.into_iter().collect()),
        }
    }
}

#[async_trait]
impl WorkspaceIo for MemoryWorkspace {
    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    async fn read(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());

        ws.write(Path::new("src/lib.rs"), "pub fn f() {}").await.unwrap();
        assert!(ws.exists(Path::new("src/lib.rs")).await);
        assert_eq!(
            ws.read(Path::new("src/lib.rs")).await.unwrap().as_deref(),
            Some("pub fn f() {}")
        );
    }

    #[tokio::test]
    async fn test_local_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        assert_eq!(ws.read(Path::new("nope.txt")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write(Path::new("a.txt"), "x").await.unwrap();
        ws.delete(Path::new("a.txt")).await.unwrap();
        ws.delete(Path::new("a.txt")).await.unwrap();
        assert!(!ws.exists(Path::new("a.txt")).await);
    }

    #[tokio::test]
    async fn test_local_no_temp_file_left() {
        let dir = tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write(Path::new("a.txt"), "x").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_workspace() {
        let ws = MemoryWorkspace::new();
        ws.write(Path::new("f.ts"), "old").await.unwrap();
        assert_eq!(ws.read(Path::new("f.ts")).await.unwrap().as_deref(), Some("old"));
        ws.delete(Path::new("f.ts")).await.unwrap();
        assert!(!ws.exists(Path::new("f.ts")).await);
    }
}
