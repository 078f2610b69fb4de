//! Local filesystem storage.
//!
//! Files live under `root/{key}` and are published by the web layer under
//! `public_prefix`, so the reference stored on a post is the public path,
//! e.g. `/uploads/blogs/2025/03/3f2a...-cover.png`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{BackendKind, BlobStore, ByteStream, PutResult, StorageError, StorageResult};

/// Local file system storage provider
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFsStore {
    /// Creates the root directory if it doesn't exist.
    #[tracing::instrument(skip(root, public_prefix))]
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::misconfigured(format!("create {}: {e}", root.display())))?;

        let public_prefix = format!("/{}", public_prefix.into().trim_matches('/'));
        tracing::info!(path = %root.display(), prefix = %public_prefix, "Created filesystem storage");

        Ok(Self { root, public_prefix })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference_for(&self, key: &str) -> String {
        if self.public_prefix == "/" {
            format!("/{key}")
        } else {
            format!("{}/{}", self.public_prefix, key)
        }
    }

    /// Map a key onto a path below the root, refusing anything that could escape it.
    fn path_for_key(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && !key.contains('\\')
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::invalid(format!("unsafe storage key: {key}")));
        }
        Ok(self.root.join(relative))
    }

    fn path_for_reference(&self, reference: &str) -> StorageResult<PathBuf> {
        let prefix = if self.public_prefix == "/" { "" } else { self.public_prefix.as_str() };
        let key = reference
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                StorageError::invalid(format!("reference {reference} is outside {}", self.public_prefix))
            })?;
        self.path_for_key(key)
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    /// Create the directory chain and the file in one step.
    ///
    /// A concurrent delete may prune the freshly created directory before
    /// the open; that surfaces as `NotFound` and is retried a bounded
    /// number of times.
    async fn create_file(&self, full_path: &Path, key: &str) -> StorageResult<fs::File> {
        let mut attempt = 1;
        loop {
            let opened = match full_path.parent() {
                Some(parent) => fs::create_dir_all(parent).await,
                None => Ok(()),
            };
            let opened = match opened {
                Ok(()) => fs::OpenOptions::new().write(true).create_new(true).open(full_path).await,
                Err(e) => Err(e),
            };

            match opened {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(StorageError::invalid(format!("object already exists at {key}")));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    tracing::debug!(path = %full_path.display(), attempt, "Blob directory vanished, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(StorageError::from_io(e, "create blob file")),
            }
        }
    }

    async fn write_stream(file: &mut fs::File, mut stream: ByteStream) -> StorageResult<u64> {
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::from_io(e, "read upload stream"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::from_io(e, "write blob"))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| StorageError::from_io(e, "flush blob"))?;
        file.sync_all().await.map_err(|e| StorageError::from_io(e, "sync blob"))?;
        Ok(written)
    }
}

const CREATE_ATTEMPTS: u32 = 5;

/// A file being written by `put`.
///
/// Removed on drop unless [`PartialFile::keep`] ran, which covers both a
/// failed stream and a caller that abandons the upload mid-write.
struct PartialFile {
    path: Option<PathBuf>,
    file: Option<fs::File>,
}

impl PartialFile {
    fn new(path: PathBuf, file: fs::File) -> Self {
        Self {
            path: Some(path),
            file: Some(file),
        }
    }

    fn file(&mut self) -> StorageResult<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::unreachable("blob file already closed"))
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        // close before removing
        drop(self.file.take());
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
        }
    }
}

#[async_trait]
impl BlobStore for LocalFsStore {
    #[tracing::instrument(skip(self, _content_type, stream))]
    async fn put(
        &self,
        key: &str,
        _content_type: Option<&str>,
        stream: ByteStream,
    ) -> StorageResult<PutResult> {
        let full_path = self.path_for_key(key)?;
        let file = self.create_file(&full_path, key).await?;

        let mut partial = PartialFile::new(full_path.clone(), file);
        let size_bytes = Self::write_stream(partial.file()?, stream).await?;
        partial.keep();

        tracing::debug!(path = %full_path.display(), size_bytes, "Saved file");
        Ok(PutResult {
            reference: self.reference_for(key),
            size_bytes,
            etag: None,
        })
    }

    async fn get(&self, reference: &str) -> StorageResult<Bytes> {
        let full_path = self.path_for_reference(reference)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(reference)),
            Err(e) => Err(StorageError::from_io(e, "read blob")),
        }
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let full_path = self.path_for_reference(reference)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| StorageError::from_io(e, "stat blob"))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, reference: &str) -> StorageResult<()> {
        let full_path = self.path_for_reference(reference)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                tracing::debug!(path = %full_path.display(), "Deleted file");
                self.prune_empty_parents(&full_path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, "delete blob")),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalFs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_follow_public_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path(), "uploads/").unwrap();
        assert_eq!(store.reference_for("blogs/a.png"), "/uploads/blogs/a.png");
        assert_eq!(
            store.path_for_reference("/uploads/blogs/a.png").unwrap(),
            dir.path().join("blogs/a.png")
        );

        let rooted = LocalFsStore::new(dir.path(), "/").unwrap();
        assert_eq!(rooted.reference_for("blogs/a.png"), "/blogs/a.png");
        assert_eq!(rooted.path_for_reference("/blogs/a.png").unwrap(), dir.path().join("blogs/a.png"));
    }

    #[test]
    fn rejects_references_escaping_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path(), "/uploads").unwrap();
        for bad in [
            "/uploads/../secret.txt",
            "/uploads//etc/passwd",
            "/elsewhere/a.png",
            "https://res.cloudinary.com/demo/image/upload/a.png",
            "/uploads/",
            "/uploadsx/a.png",
        ] {
            assert!(
                matches!(store.path_for_reference(bad), Err(StorageError::InvalidPayload { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
