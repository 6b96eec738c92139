//! Filesystem access
//!
//! Raw file operations behind a trait so the engine can run against any
//! backing store. `TokioFileSystem` is the default.

use std::fmt::Debug;
use std::io;
use std::path::Path;

use async_trait::async_trait;

#[async_trait]
pub trait FileSystem: Send + Sync + Debug {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Creates or truncates the file at `path`.
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    async fn remove(&self, path: &Path) -> io::Result<()>;

    /// Replaces `to` with `from` in one step.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

// == Tokio Filesystem ==
/// Real filesystem through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let path = dir.path().join("nested").join("value.cache");

        fs.create_dir_all(path.parent().unwrap()).await.unwrap();
        fs.write(&path, b"one").await.unwrap();
        fs.write(&path, b"two").await.unwrap();
        assert_eq!(fs.read(&path).await.unwrap(), b"two");

        fs.remove(&path).await.unwrap();
        let err = fs.read(&path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rename_replaces_target() {
        let dir = TempDir::new().unwrap();
        let fs = TokioFileSystem;
        let tmp = dir.path().join("a.tmp");
        let target = dir.path().join("a");

        fs.write(&target, b"old").await.unwrap();
        fs.write(&tmp, b"new").await.unwrap();
        fs.rename(&tmp, &target).await.unwrap();

        assert_eq!(fs.read(&target).await.unwrap(), b"new");
        assert!(!tmp.exists());
    }
}
