use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

use super::BlobStore;

/// Blob store backed by a directory; keys are relative paths.
///
/// This is the worker-side view of the published data directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadFailed { path, source: e }),
        }
    }

    /// Writes go to a `.partial` sibling first and are renamed into place, so
    /// a reader sees either the old blob or the complete new one.
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::WriteFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &data)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: partial.clone(),
                source: e,
            })?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StoreError::WriteFailed { path, source: e })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::ReadFailed { path, source: e })
    }
}
